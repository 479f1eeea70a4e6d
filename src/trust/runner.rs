use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::exec::{CommandRunner, CommandSpec};
use crate::git::GitService;
use crate::utils::expand_env_vars;

/// Built-in action: share top-level untracked files and editor settings
/// from the primary worktree.
pub const LINK_TOP_SYMLINKS: &str = "link_topsymlinks";

const SKIPPED_TOP_LEVEL: &[&str] = &[".DS_Store", ".mypy_cache"];
const EDITOR_DIRS: &[&str] = &[".cursor", ".claude", ".idea", ".vscode"];

/// Environment exported to every hook command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEnv {
    pub branch: String,
    pub main_path: PathBuf,
    pub worktree_path: PathBuf,
    pub worktree_name: String,
}

impl HookEnv {
    pub fn vars(&self) -> Vec<(String, String)> {
        vec![
            ("WORKTREE_BRANCH".to_string(), self.branch.clone()),
            (
                "MAIN_WORKTREE_PATH".to_string(),
                self.main_path.display().to_string(),
            ),
            (
                "WORKTREE_PATH".to_string(),
                self.worktree_path.display().to_string(),
            ),
            ("WORKTREE_NAME".to_string(), self.worktree_name.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    pub command: String,
    pub reason: String,
}

/// Runs `commands` in order inside `cwd`, stopping at the first failure.
pub async fn run_hooks<R: CommandRunner>(
    git: &GitService<R>,
    commands: &[String],
    cwd: &Path,
    env: &HookEnv,
) -> Result<(), HookFailure> {
    let vars = env.vars();
    let mut expansion: HashMap<String, String> = std::env::vars().collect();
    expansion.extend(vars.iter().cloned());

    for command in commands {
        if command == LINK_TOP_SYMLINKS {
            link_top_symlinks(git, &env.main_path, &env.worktree_path).await;
            continue;
        }

        let expanded = expand_env_vars(command, &expansion);
        tracing::info!("running hook: {}", expanded);
        let mut spec = CommandSpec::new("sh").args(["-c", expanded.as_str()]).cwd(cwd);
        for (key, value) in &vars {
            spec = spec.env(key, value);
        }
        let out = git.runner().run(&spec).await;
        if !out.is_success() {
            return Err(HookFailure {
                command: expanded,
                reason: out.failure_reason(),
            });
        }
    }
    Ok(())
}

/// Best effort: individual link failures are logged and skipped.
pub async fn link_top_symlinks<R: CommandRunner>(git: &GitService<R>, main: &Path, target: &Path) {
    let listed = git
        .run(
            CommandSpec::git(["ls-files", "--others", "--ignored", "--exclude-standard"])
                .cwd(main),
        )
        .await;

    let mut names: Vec<&str> = listed
        .text()
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.contains('/'))
        .filter(|name| !SKIPPED_TOP_LEVEL.contains(name))
        .collect();
    names.sort_unstable();
    names.dedup();

    for name in names.into_iter().chain(EDITOR_DIRS.iter().copied()) {
        link_if_absent(&main.join(name), &target.join(name)).await;
    }

    if let Err(e) = tokio::fs::create_dir_all(target.join("tmp")).await {
        tracing::warn!("Failed to create tmp/ in {}: {}", target.display(), e);
    }

    if matches!(tokio::fs::try_exists(target.join(".envrc")).await, Ok(true)) {
        let out = git
            .runner()
            .run(&CommandSpec::new("direnv").args(["allow", "."]).cwd(target))
            .await;
        if !out.is_success() {
            tracing::debug!("direnv allow skipped: {}", out.failure_reason());
        }
    }
}

async fn link_if_absent(source: &Path, dest: &Path) {
    if !matches!(tokio::fs::try_exists(source).await, Ok(true)) {
        return;
    }
    if tokio::fs::symlink_metadata(dest).await.is_ok() {
        return;
    }
    #[cfg(unix)]
    {
        if let Err(e) = tokio::fs::symlink(source, dest).await {
            tracing::warn!("Failed to link {} -> {}: {}", dest.display(), source.display(), e);
        }
    }
}
