use anyhow::{bail, Result};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::{Engine, RefreshOutcome, WorktreeState};
use crate::trust::{TrustDecision, TrustMode, TrustRequest};

/// Opens the engine for the current directory. In `ask` mode trust
/// requests are answered on the terminal.
pub async fn open_engine(config: &Config) -> Engine {
    let prompts = (config.trust_mode == TrustMode::Ask).then(spawn_terminal_prompter);
    Engine::open(config, None, prompts).await
}

/// Opens the engine and publishes a live state, failing outside a repository.
pub async fn open_with_state(config: &Config) -> Result<(Engine, WorktreeState)> {
    let engine = open_engine(config).await;
    match engine.refresh().await {
        RefreshOutcome::Published(state) => Ok((engine, state)),
        RefreshOutcome::Superseded => {
            let state = engine.snapshot();
            Ok((engine, state))
        }
        RefreshOutcome::Unavailable => bail!("Could not list worktrees; is this a git repository?"),
    }
}

/// Resolves a user-supplied worktree reference: a path, a branch name or a
/// worktree directory name.
pub fn resolve_worktree(state: &WorktreeState, reference: &str) -> PathBuf {
    let as_path = Path::new(reference);
    let absolute = std::path::absolute(as_path).unwrap_or_else(|_| as_path.to_path_buf());
    let canonical = std::fs::canonicalize(as_path).ok();

    state
        .records
        .iter()
        .find(|r| r.path == absolute || Some(&r.path) == canonical.as_ref())
        .or_else(|| state.records.iter().find(|r| r.branch == reference))
        .or_else(|| state.records.iter().find(|r| r.dir_name() == reference))
        .map(|r| r.path.clone())
        .unwrap_or(absolute)
}

fn spawn_terminal_prompter() -> mpsc::Sender<TrustRequest> {
    let (tx, mut rx) = mpsc::channel::<TrustRequest>(4);
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let answered = tokio::task::spawn_blocking(move || {
                let stdin = std::io::stdin();
                let decision = read_decision(
                    &mut stdin.lock(),
                    &mut std::io::stderr(),
                    &request.config_path,
                    &request.commands,
                );
                request.respond(decision);
            })
            .await;
            if let Err(e) = answered {
                tracing::warn!("Trust prompt failed: {}", e);
            }
        }
    });
    tx
}

/// Shows the commands and reads `t`rust, `b`lock or `c`ancel.
/// End of input counts as cancel.
pub fn read_decision<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    config_path: &Path,
    commands: &[String],
) -> TrustDecision {
    let _ = writeln!(output, "\n{} wants to run:", config_path.display());
    for command in commands {
        let _ = writeln!(output, "  {}", command);
    }

    loop {
        let _ = write!(output, "[t]rust / [b]lock / [c]ancel: ");
        let _ = output.flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return TrustDecision::Cancel,
            Ok(_) => {}
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "t" | "trust" => return TrustDecision::Trust,
            "b" | "block" => return TrustDecision::Block,
            "c" | "cancel" => return TrustDecision::Cancel,
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorktreeRecord;
    use std::io::Cursor;

    fn decide(input: &str) -> (TrustDecision, String) {
        let mut output = Vec::new();
        let decision = read_decision(
            &mut Cursor::new(input.as_bytes()),
            &mut output,
            Path::new("/r/main/.wt"),
            &["make setup".to_string()],
        );
        (decision, String::from_utf8(output).unwrap())
    }

    #[test]
    fn read_decision_accepts_short_and_long_answers() {
        assert_eq!(decide("t\n").0, TrustDecision::Trust);
        assert_eq!(decide("Block\n").0, TrustDecision::Block);
        assert_eq!(decide("c\n").0, TrustDecision::Cancel);
    }

    #[test]
    fn read_decision_reprompts_on_unknown_input() {
        let (decision, shown) = decide("yes\n\nb\n");
        assert_eq!(decision, TrustDecision::Block);
        assert_eq!(shown.matches("[t]rust").count(), 3);
        assert!(shown.contains("  make setup"));
    }

    #[test]
    fn read_decision_treats_eof_as_cancel() {
        assert_eq!(decide("").0, TrustDecision::Cancel);
    }

    #[test]
    fn resolve_worktree_by_branch_or_dir_name() {
        let state = WorktreeState {
            records: vec![
                WorktreeRecord::new("/r/main", "main", true),
                WorktreeRecord::new("/r/wt/feat-dir", "feature/x", false),
            ],
            ..WorktreeState::default()
        };
        assert_eq!(resolve_worktree(&state, "feature/x"), PathBuf::from("/r/wt/feat-dir"));
        assert_eq!(resolve_worktree(&state, "feat-dir"), PathBuf::from("/r/wt/feat-dir"));
        assert_eq!(resolve_worktree(&state, "/r/main"), PathBuf::from("/r/main"));
        assert_eq!(resolve_worktree(&state, "/r/gone"), PathBuf::from("/r/gone"));
    }
}
