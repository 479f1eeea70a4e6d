use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use super::{CommandRunner, CommandSpec, RunOutput};

type Step = (RunOutput, Option<Duration>);

/// Scripted runner for tests. Responses are keyed by command line and,
/// optionally, working directory; a cwd-specific entry wins over a generic one.
/// When several outputs are queued for a key they are consumed in order and
/// the last one repeats. Unscripted commands fail as if the binary were missing.
#[derive(Default)]
pub struct FakeRunner {
    scripts: Mutex<HashMap<(String, Option<PathBuf>), Vec<Step>>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, command_line: &str, output: RunOutput) -> &Self {
        self.insert(command_line, None, vec![(output, None)]);
        self
    }

    pub fn set_ok(&self, command_line: &str, stdout: &str) -> &Self {
        self.set(command_line, RunOutput::success(stdout))
    }

    pub fn set_in(&self, command_line: &str, cwd: &str, output: RunOutput) -> &Self {
        self.insert(command_line, Some(PathBuf::from(cwd)), vec![(output, None)]);
        self
    }

    pub fn set_sequence(&self, command_line: &str, outputs: Vec<RunOutput>) -> &Self {
        self.insert(command_line, None, outputs.into_iter().map(|o| (o, None)).collect());
        self
    }

    /// Queues outputs that are each returned only after their own delay.
    pub fn set_timed(&self, command_line: &str, steps: Vec<(RunOutput, Duration)>) -> &Self {
        self.insert(
            command_line,
            None,
            steps.into_iter().map(|(o, d)| (o, Some(d))).collect(),
        );
        self
    }

    fn insert(&self, command_line: &str, cwd: Option<PathBuf>, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert((command_line.to_string(), cwd), steps);
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.command_line()).collect()
    }

    pub fn count(&self, command_line: &str) -> usize {
        self.call_lines().iter().filter(|l| *l == command_line).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.call_lines().iter().filter(|l| l.starts_with(prefix)).count()
    }

    fn next_output(&self, spec: &CommandSpec) -> Option<Step> {
        let line = spec.command_line();
        let mut scripts = self.scripts.lock().unwrap();
        let key = if scripts.contains_key(&(line.clone(), spec.cwd.clone())) {
            (line, spec.cwd.clone())
        } else {
            (line, None)
        };
        let steps = scripts.get_mut(&key)?;
        if steps.len() > 1 {
            Some(steps.remove(0))
        } else {
            steps.first().cloned()
        }
    }
}

#[async_trait::async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> RunOutput {
        self.calls.lock().unwrap().push(spec.clone());
        match self.next_output(spec) {
            Some((output, delay)) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                output
            }
            None => RunOutput::spawn_failed("unscripted command"),
        }
    }
}
