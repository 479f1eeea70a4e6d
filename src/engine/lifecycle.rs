use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::exec::{CommandRunner, CommandSpec, RunOutput};
use crate::models::WorktreeRecord;
use crate::trust::{run_hooks, HookEnv, HookFile, HookKind, HookResolution};

use super::orchestrator::Engine;
use super::state::RefreshOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Hooks,
    WorktreeAdd,
    WorktreeMove,
    BranchRename,
    Checkout,
    Merge,
    WorktreeRemove,
    BranchDelete,
    Fetch,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Hooks => "hooks",
            Step::WorktreeAdd => "worktree add",
            Step::WorktreeMove => "worktree move",
            Step::BranchRename => "branch rename",
            Step::Checkout => "checkout",
            Step::Merge => "merge",
            Step::WorktreeRemove => "worktree remove",
            Step::BranchDelete => "branch delete",
            Step::Fetch => "fetch",
        };
        f.write_str(name)
    }
}

/// Precondition failures, detected before any process is started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("the primary worktree cannot be {0}")]
    PrimaryWorktree(&'static str),

    #[error("a detached worktree cannot be {0}")]
    Detached(&'static str),

    #[error("name must not be empty")]
    EmptyName,

    #[error("new name is the same as the current branch")]
    UnchangedName,

    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("no known worktree at {}", .0.display())]
    UnknownWorktree(PathBuf),

    #[error("the primary worktree is not known yet")]
    NoPrimary,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{step} failed: {reason}")]
    StepFailed { step: Step, reason: String },
}

impl LifecycleError {
    fn step(step: Step, out: &RunOutput) -> Self {
        LifecycleError::StepFailed {
            step,
            reason: out.failure_reason(),
        }
    }
}

type LifecycleResult<T> = Result<T, LifecycleError>;

impl<R: CommandRunner> Engine<R> {
    /// Published record for `path` together with the primary worktree.
    fn target(&self, path: &Path, verb: &'static str) -> Result<(WorktreeRecord, WorktreeRecord), Rejection> {
        let record = self
            .published_record(path)
            .ok_or_else(|| Rejection::UnknownWorktree(path.to_path_buf()))?;
        if record.is_primary {
            return Err(Rejection::PrimaryWorktree(verb));
        }
        let primary = self.published_primary().ok_or(Rejection::NoPrimary)?;
        Ok((record, primary))
    }

    /// Repository hook commands for `kind`, resolved through the trust gate.
    async fn repo_hooks(&self, primary: &Path, kind: HookKind) -> LifecycleResult<Vec<String>> {
        let config_path = HookFile::path_in(primary);
        match self.trust.resolve(&config_path, kind).await {
            HookResolution::Run(commands) => Ok(commands),
            HookResolution::Skip => Ok(Vec::new()),
            HookResolution::Cancelled => Err(LifecycleError::Cancelled),
        }
    }

    fn hook_commands(&self, kind: HookKind, repo: Vec<String>) -> Vec<String> {
        let global = match kind {
            HookKind::Init => &self.settings.init_commands,
            HookKind::Terminate => &self.settings.terminate_commands,
        };
        global.iter().cloned().chain(repo).collect()
    }

    async fn run_step(&self, step: Step, spec: CommandSpec) -> LifecycleResult<RunOutput> {
        tracing::info!("{}: {}", step, spec.command_line());
        let out = self.git.run(spec).await;
        if out.is_success() {
            Ok(out)
        } else {
            Err(LifecycleError::step(step, &out))
        }
    }

    async fn run_hook_step(&self, commands: &[String], cwd: &Path, env: &HookEnv) -> LifecycleResult<()> {
        if commands.is_empty() {
            return Ok(());
        }
        run_hooks(&self.git, commands, cwd, env)
            .await
            .map_err(|failure| LifecycleError::StepFailed {
                step: Step::Hooks,
                reason: format!("`{}`: {}", failure.command, failure.reason),
            })
    }

    /// Re-lists worktrees unless the operation stopped before touching the
    /// repository.
    async fn relist_after<T>(&self, result: LifecycleResult<T>) -> LifecycleResult<T> {
        match &result {
            Err(LifecycleError::Rejected(_)) | Err(LifecycleError::Cancelled) => {}
            _ => {
                self.refresh().await;
            }
        }
        result
    }

    /// Creates `<worktree_root>/<name>` on branch `name`, creating the branch
    /// when it does not exist, then runs init hooks inside it.
    pub async fn create(&self, name: &str) -> LifecycleResult<PathBuf> {
        let result = self.create_steps(name).await;
        self.relist_after(result).await
    }

    async fn create_steps(&self, name: &str) -> LifecycleResult<PathBuf> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Rejection::EmptyName.into());
        }
        let primary = self.published_primary().ok_or(Rejection::NoPrimary)?;
        let dest = self.settings.worktree_root.join(name);
        if path_exists(&dest).await {
            return Err(Rejection::DestinationExists(dest).into());
        }

        let repo = self.repo_hooks(&primary.path, HookKind::Init).await?;

        let dest_arg = dest.display().to_string();
        let add = self
            .git
            .run(CommandSpec::git(["worktree", "add", dest_arg.as_str(), name]))
            .await;
        if !add.is_success() {
            if !add.stderr.contains("invalid reference") {
                return Err(LifecycleError::step(Step::WorktreeAdd, &add));
            }
            self.run_step(
                Step::WorktreeAdd,
                CommandSpec::git(["worktree", "add", "-b", name, dest_arg.as_str()]),
            )
            .await?;
        }

        let env = HookEnv {
            branch: name.to_string(),
            main_path: primary.path.clone(),
            worktree_path: dest.clone(),
            worktree_name: dir_name(&dest),
        };
        self.run_hook_step(&self.hook_commands(HookKind::Init, repo), &dest, &env)
            .await?;
        Ok(dest)
    }

    /// Moves the worktree to a sibling directory named `new_name` and renames
    /// its branch to match.
    pub async fn rename(&self, path: &Path, new_name: &str) -> LifecycleResult<PathBuf> {
        let result = self.rename_steps(path, new_name).await;
        self.relist_after(result).await
    }

    async fn rename_steps(&self, path: &Path, new_name: &str) -> LifecycleResult<PathBuf> {
        let (record, _) = self.target(path, "renamed")?;
        if record.is_detached() {
            return Err(Rejection::Detached("renamed").into());
        }
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(Rejection::EmptyName.into());
        }
        if new_name == record.branch {
            return Err(Rejection::UnchangedName.into());
        }
        let dest = record
            .path
            .parent()
            .map(|parent| parent.join(new_name))
            .unwrap_or_else(|| PathBuf::from(new_name));
        if path_exists(&dest).await {
            return Err(Rejection::DestinationExists(dest).into());
        }

        self.run_step(
            Step::WorktreeMove,
            CommandSpec::git(["worktree", "move"]).args([
                record.path.display().to_string(),
                dest.display().to_string(),
            ]),
        )
        .await?;
        self.run_step(
            Step::BranchRename,
            CommandSpec::git(["branch", "-m", record.branch.as_str(), new_name]),
        )
        .await?;
        Ok(dest)
    }

    /// Runs terminate hooks, removes the worktree and deletes its branch.
    pub async fn delete(&self, path: &Path) -> LifecycleResult<()> {
        let result = self.delete_steps(path).await;
        self.relist_after(result).await
    }

    async fn delete_steps(&self, path: &Path) -> LifecycleResult<()> {
        let (record, primary) = self.target(path, "deleted")?;
        let repo = self.repo_hooks(&primary.path, HookKind::Terminate).await?;
        self.run_hook_step(
            &self.hook_commands(HookKind::Terminate, repo),
            &primary.path,
            &hook_env(&record, &primary),
        )
        .await?;
        self.remove_worktree_and_branch(&record, &primary).await
    }

    /// Merges the worktree's branch into the main branch from the primary
    /// worktree, then deletes it like `delete`.
    pub async fn absorb(&self, path: &Path) -> LifecycleResult<()> {
        let result = self.absorb_steps(path).await;
        self.relist_after(result).await
    }

    async fn absorb_steps(&self, path: &Path) -> LifecycleResult<()> {
        let (record, primary) = self.target(path, "absorbed")?;
        if record.is_detached() {
            return Err(Rejection::Detached("absorbed").into());
        }
        let repo = self.repo_hooks(&primary.path, HookKind::Terminate).await?;
        self.run_hook_step(
            &self.hook_commands(HookKind::Terminate, repo),
            &primary.path,
            &hook_env(&record, &primary),
        )
        .await?;

        let main = self.git.main_branch().await;
        self.run_step(
            Step::Checkout,
            CommandSpec::git(["checkout", main.as_str()]).cwd(&primary.path),
        )
        .await?;
        self.run_step(
            Step::Merge,
            CommandSpec::git(["merge", "--no-edit", record.branch.as_str()]).cwd(&primary.path),
        )
        .await?;
        self.remove_worktree_and_branch(&record, &primary).await
    }

    async fn remove_worktree_and_branch(
        &self,
        record: &WorktreeRecord,
        primary: &WorktreeRecord,
    ) -> LifecycleResult<()> {
        self.run_step(
            Step::WorktreeRemove,
            CommandSpec::git(["worktree", "remove", "--force"])
                .args([record.path.display().to_string()])
                .cwd(&primary.path),
        )
        .await?;
        if record.is_detached() {
            return Ok(());
        }
        self.run_step(
            Step::BranchDelete,
            CommandSpec::git(["branch", "-D", record.branch.as_str()]).cwd(&primary.path),
        )
        .await?;
        Ok(())
    }

    /// Fetches all remotes, then refreshes.
    pub async fn fetch(&self) -> LifecycleResult<RefreshOutcome> {
        let out = self.git.fetch_all().await;
        if !out.is_success() {
            return Err(LifecycleError::step(Step::Fetch, &out));
        }
        Ok(self.refresh().await)
    }
}

fn hook_env(record: &WorktreeRecord, primary: &WorktreeRecord) -> HookEnv {
    HookEnv {
        branch: record.branch.clone(),
        main_path: primary.path.clone(),
        worktree_path: record.path.clone(),
        worktree_name: record.dir_name(),
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::orchestrator::testing::*;
    use crate::exec::FakeRunner;
    use crate::git::fixtures::*;
    use crate::trust::{TrustDecision, TrustMode, TrustRequest};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const HOOKS: &str = "init_commands:\n  - echo init\nterminate_commands:\n  - echo bye\n";

    /// A repository whose worktrees live in a temp dir, so hook files are real.
    struct Repo {
        dir: TempDir,
        main: PathBuf,
        feat: PathBuf,
    }

    impl Repo {
        fn new(hooks: Option<&str>) -> Self {
            let dir = TempDir::new().unwrap();
            let main = dir.path().join("main");
            let feat = dir.path().join("feat");
            std::fs::create_dir_all(&main).unwrap();
            std::fs::create_dir_all(&feat).unwrap();
            if let Some(hooks) = hooks {
                std::fs::write(main.join(".wt"), hooks).unwrap();
            }
            Self { dir, main, feat }
        }

        fn script(&self, fake: &FakeRunner) {
            fake.set_ok(LIST, &porcelain(&[(&self.main, "main"), (&self.feat, "feat")]));
            fake.set_ok(STATUS, "# branch.ab +0 -0\n");
        }

        fn line(&self, args: &str) -> String {
            args.replace("{feat}", &self.feat.display().to_string())
        }
    }

    async fn ready(repo: &Repo, mode: TrustMode, prompts: Option<mpsc::Sender<TrustRequest>>) -> Harness {
        let fake = FakeRunner::new();
        repo.script(&fake);
        let h = harness(fake, mode, prompts);
        h.engine.refresh().await;
        h
    }

    fn answering(decision: TrustDecision) -> mpsc::Sender<TrustRequest> {
        let (tx, mut rx) = mpsc::channel::<TrustRequest>(4);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                request.respond(decision);
            }
        });
        tx
    }

    fn hook_calls(h: &Harness) -> usize {
        h.fake.count_prefix("sh -c")
    }

    #[tokio::test]
    async fn deleting_primary_is_rejected_without_spawning() {
        let repo = Repo::new(Some(HOOKS));
        let h = ready(&repo, TrustMode::Always, None).await;
        let before = h.fake.calls().len();

        let err = h.engine.delete(&repo.main).await.unwrap_err();
        assert_eq!(err, LifecycleError::Rejected(Rejection::PrimaryWorktree("deleted")));
        assert_eq!(h.fake.calls().len(), before, "no process may run for a rejected delete");
    }

    #[tokio::test]
    async fn unknown_worktree_is_rejected() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        let err = h.engine.absorb(Path::new("/nowhere")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Rejected(Rejection::UnknownWorktree(_))));
    }

    #[tokio::test]
    async fn delete_runs_hooks_in_primary_then_removes_and_deletes_branch() {
        let repo = Repo::new(Some(HOOKS));
        let h = ready(&repo, TrustMode::Always, None).await;
        h.fake.set_ok("sh -c echo bye", "bye");
        h.fake.set_ok(&repo.line("git worktree remove --force {feat}"), "");
        h.fake.set_ok("git branch -D feat", "");

        h.engine.delete(&repo.feat).await.unwrap();

        let calls = h.fake.calls();
        let hook = calls.iter().find(|c| c.program == "sh").unwrap();
        assert_eq!(hook.cwd.as_deref(), Some(repo.main.as_path()));
        assert!(hook
            .env
            .contains(&("WORKTREE_PATH".to_string(), repo.feat.display().to_string())));
        let lines = h.fake.call_lines();
        let hook_at = lines.iter().position(|l| l == "sh -c echo bye").unwrap();
        let remove_at = lines.iter().position(|l| l.starts_with("git worktree remove")).unwrap();
        let branch_at = lines.iter().position(|l| l == "git branch -D feat").unwrap();
        assert!(hook_at < remove_at && remove_at < branch_at);
    }

    #[tokio::test]
    async fn delete_relists_worktrees() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        h.fake.set_ok(&repo.line("git worktree remove --force {feat}"), "");
        h.fake.set_ok("git branch -D feat", "");
        h.fake.set_ok(LIST, &porcelain(&[(&repo.main, "main")]));

        h.engine.delete(&repo.feat).await.unwrap();
        assert_eq!(h.fake.count(LIST), 2);
        let state = h.engine.snapshot();
        assert_eq!(state.records.len(), 1);
        assert!(h.engine.published_record(&repo.feat).is_none());
        assert_eq!(
            h.engine.delete(&repo.feat).await,
            Err(LifecycleError::Rejected(Rejection::UnknownWorktree(repo.feat.clone())))
        );
    }

    #[tokio::test]
    async fn failed_step_still_relists_but_rejection_does_not() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        h.fake.set_ok(&repo.line("git worktree remove --force {feat}"), "");
        h.fake.set("git branch -D feat", RunOutput::rejected(1, "not fully merged"));

        let err = h.engine.delete(&repo.feat).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StepFailed { step: Step::BranchDelete, .. }));
        assert_eq!(h.fake.count(LIST), 2, "partial delete must re-list");

        h.engine.rename(&repo.main, "x").await.unwrap_err();
        assert_eq!(h.fake.count(LIST), 2);
    }

    #[tokio::test]
    async fn never_mode_runs_no_hooks_and_proceeds() {
        let repo = Repo::new(Some(HOOKS));
        let h = ready(&repo, TrustMode::Never, Some(answering(TrustDecision::Trust))).await;
        h.fake.set_ok(&repo.line("git worktree remove --force {feat}"), "");
        h.fake.set_ok("git branch -D feat", "");

        h.engine.delete(&repo.feat).await.unwrap();
        assert_eq!(hook_calls(&h), 0);
        assert_eq!(h.fake.count("git branch -D feat"), 1);
    }

    #[tokio::test]
    async fn cancelled_trust_aborts_before_any_mutation() {
        let repo = Repo::new(Some(HOOKS));
        let h = ready(&repo, TrustMode::Ask, Some(answering(TrustDecision::Cancel))).await;

        assert_eq!(h.engine.delete(&repo.feat).await, Err(LifecycleError::Cancelled));
        assert_eq!(h.fake.count_prefix("git worktree remove"), 0);
        assert_eq!(h.engine.create("new").await, Err(LifecycleError::Cancelled));
        assert_eq!(h.fake.count_prefix("git worktree add"), 0);
    }

    #[tokio::test]
    async fn blocked_hooks_are_skipped_but_operation_continues() {
        let repo = Repo::new(Some(HOOKS));
        let h = ready(&repo, TrustMode::Ask, Some(answering(TrustDecision::Block))).await;
        h.fake.set_ok(&repo.line("git worktree remove --force {feat}"), "");
        h.fake.set_ok("git branch -D feat", "");

        h.engine.delete(&repo.feat).await.unwrap();
        assert_eq!(hook_calls(&h), 0);
    }

    #[tokio::test]
    async fn failing_hook_halts_before_removal() {
        let repo = Repo::new(Some(HOOKS));
        let h = ready(&repo, TrustMode::Always, None).await;
        h.fake.set("sh -c echo bye", RunOutput::rejected(2, "boom"));

        let err = h.engine.delete(&repo.feat).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StepFailed { step: Step::Hooks, .. }));
        assert_eq!(h.fake.count_prefix("git worktree remove"), 0);
    }

    #[tokio::test]
    async fn failed_remove_reports_step_and_keeps_branch() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        h.fake.set(
            &repo.line("git worktree remove --force {feat}"),
            RunOutput::rejected(128, "fatal: locked"),
        );

        let err = h.engine.delete(&repo.feat).await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::StepFailed {
                step: Step::WorktreeRemove,
                reason: "fatal: locked".to_string()
            }
        );
        assert_eq!(err.to_string(), "worktree remove failed: fatal: locked");
        assert_eq!(h.fake.count_prefix("git branch -D"), 0);
    }

    #[tokio::test]
    async fn absorb_merges_from_primary_worktree() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        h.fake.set_ok("git checkout main", "");
        h.fake.set_ok("git merge --no-edit feat", "");
        h.fake.set_ok(&repo.line("git worktree remove --force {feat}"), "");
        h.fake.set_ok("git branch -D feat", "");

        h.engine.absorb(&repo.feat).await.unwrap();
        let calls = h.fake.calls();
        for line in ["git checkout main", "git merge --no-edit feat"] {
            let call = calls.iter().find(|c| c.command_line() == line).unwrap();
            assert_eq!(call.cwd.as_deref(), Some(repo.main.as_path()), "{line}");
        }
    }

    #[tokio::test]
    async fn absorb_stops_at_merge_conflict() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        h.fake.set_ok("git checkout main", "");
        h.fake.set("git merge --no-edit feat", RunOutput::rejected(1, "CONFLICT"));

        let err = h.engine.absorb(&repo.feat).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StepFailed { step: Step::Merge, .. }));
        assert_eq!(h.fake.count_prefix("git worktree remove"), 0);
    }

    #[tokio::test]
    async fn create_retries_with_new_branch_and_runs_init_hooks_inside() {
        let repo = Repo::new(Some(HOOKS));
        let h = ready(&repo, TrustMode::Always, None).await;
        let dest = h.engine.settings().worktree_root.join("topic");
        let dest_s = dest.display().to_string();
        h.fake.set(
            &format!("git worktree add {dest_s} topic"),
            RunOutput::rejected(128, "fatal: invalid reference: topic"),
        );
        h.fake.set_ok(&format!("git worktree add -b topic {dest_s}"), "");
        h.fake.set_ok("sh -c echo init", "init");

        let created = h.engine.create("  topic ").await.unwrap();
        assert_eq!(created, dest);
        let hook = h.fake.calls().into_iter().find(|c| c.program == "sh").unwrap();
        assert_eq!(hook.cwd, Some(dest));
        assert!(hook
            .env
            .contains(&("MAIN_WORKTREE_PATH".to_string(), repo.main.display().to_string())));
    }

    #[tokio::test]
    async fn create_rejects_empty_name_and_existing_destination() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        assert_eq!(
            h.engine.create("   ").await,
            Err(LifecycleError::Rejected(Rejection::EmptyName))
        );

        let taken = h.engine.settings().worktree_root.join("taken");
        std::fs::create_dir_all(&taken).unwrap();
        assert_eq!(
            h.engine.create("taken").await,
            Err(LifecycleError::Rejected(Rejection::DestinationExists(taken)))
        );
        assert_eq!(h.fake.count_prefix("git worktree add"), 0);
    }

    #[tokio::test]
    async fn rename_moves_then_renames_branch() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        let dest = repo.dir.path().join("feat-2");
        h.fake.set_ok(
            &format!("git worktree move {} {}", repo.feat.display(), dest.display()),
            "",
        );
        h.fake.set_ok("git branch -m feat feat-2", "");

        assert_eq!(h.engine.rename(&repo.feat, "feat-2").await, Ok(dest));
        assert_eq!(
            h.engine.rename(&repo.feat, "feat").await,
            Err(LifecycleError::Rejected(Rejection::UnchangedName))
        );
        assert_eq!(
            h.engine.rename(&repo.main, "x").await,
            Err(LifecycleError::Rejected(Rejection::PrimaryWorktree("renamed")))
        );
    }

    #[tokio::test]
    async fn rename_into_existing_directory_is_rejected() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        assert_eq!(
            h.engine.rename(&repo.feat, "main").await,
            Err(LifecycleError::Rejected(Rejection::DestinationExists(repo.main.clone())))
        );
        assert_eq!(h.fake.count_prefix("git worktree move"), 0);
    }

    #[tokio::test]
    async fn fetch_failure_is_attributed() {
        let repo = Repo::new(None);
        let h = ready(&repo, TrustMode::Ask, None).await;
        h.fake.set("git fetch --all --quiet", RunOutput::rejected(1, "no remote"));
        assert_eq!(
            h.engine.fetch().await,
            Err(LifecycleError::StepFailed {
                step: Step::Fetch,
                reason: "no remote".to_string()
            })
        );

        h.fake.set_ok("git fetch --all --quiet", "");
        assert!(h.engine.fetch().await.unwrap().state().is_some());
    }
}
