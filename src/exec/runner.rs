use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Exit codes a command may return and still count as a success.
const DEFAULT_ACCEPTED: &[i32] = &[0];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    pub accepted: Vec<i32>,
    pub trim: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stdin: None,
            accepted: DEFAULT_ACCEPTED.to_vec(),
            trim: true,
        }
    }

    pub fn git<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("git").args(args)
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn accept(mut self, codes: &[i32]) -> Self {
        self.accepted = codes.to_vec();
        self
    }

    /// Keep surrounding whitespace in stdout (diff text needs its trailing newlines).
    pub fn raw(mut self) -> Self {
        self.trim = false;
        self
    }

    /// The command line as a single string, used for logging and fake lookups.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Rejected { code: Option<i32> },
    SpawnFailed,
    DecodeFailed,
}

/// Outcome of one process invocation. Failures never surface as errors:
/// stdout is empty unless the status is `Success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn rejected(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Rejected { code: Some(code) },
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::SpawnFailed,
            stdout: String::new(),
            stderr: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Stdout when the command succeeded; `None` means "unknown", not "empty".
    pub fn text(&self) -> Option<&str> {
        self.is_success().then_some(self.stdout.as_str())
    }

    pub fn into_text(self) -> String {
        if self.is_success() {
            self.stdout
        } else {
            String::new()
        }
    }

    /// Best human-readable reason for a failed run.
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        match self.status {
            RunStatus::Success => String::new(),
            _ if !stderr.is_empty() => stderr.to_string(),
            RunStatus::Rejected { code: Some(code) } => format!("exited with status {code}"),
            RunStatus::Rejected { code: None } => "terminated by signal".to_string(),
            RunStatus::SpawnFailed => "failed to start process".to_string(),
            RunStatus::DecodeFailed => "output was not valid UTF-8".to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> RunOutput;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait::async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> RunOutput {
        tracing::debug!(cmd = %spec.command_line(), cwd = ?spec.cwd, "running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!("failed to spawn {}: {}", spec.program, e);
                return RunOutput::spawn_failed(e.to_string());
            }
        };

        // Feed stdin concurrently with draining stdout, or a filter that fills
        // its output pipe blocks forever.
        let writer = match (&spec.stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => {
                let input = input.clone().into_bytes();
                let program = spec.program.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(&input).await {
                        tracing::debug!("failed to write stdin for {}: {}", program, e);
                    }
                }))
            }
            _ => None,
        };

        let output = child.wait_with_output().await;
        if let Some(writer) = writer {
            let _ = writer.await;
        }
        let output = match output {
            Ok(output) => output,
            Err(e) => return RunOutput::spawn_failed(e.to_string()),
        };

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code();
        if !code.is_some_and(|c| spec.accepted.contains(&c)) {
            tracing::debug!(
                cmd = %spec.command_line(),
                ?code,
                "command rejected: {}",
                stderr.trim()
            );
            return RunOutput {
                status: RunStatus::Rejected { code },
                stdout: String::new(),
                stderr,
            };
        }

        match String::from_utf8(output.stdout) {
            Ok(stdout) => RunOutput {
                status: RunStatus::Success,
                stdout: if spec.trim {
                    stdout.trim().to_string()
                } else {
                    stdout
                },
                stderr,
            },
            Err(_) => RunOutput {
                status: RunStatus::DecodeFailed,
                stdout: String::new(),
                stderr,
            },
        }
    }
}
