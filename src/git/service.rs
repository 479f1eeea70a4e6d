use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tokio::sync::OnceCell;

use crate::exec::{CommandRunner, CommandSpec, ProcessRunner, RunOutput};
use crate::models::WorktreeRecord;

use super::parse::{self, CommitInfo, CommitLine, ShortStatusLine, StatusCounts, ACTIVITY_FORMAT};

pub const DEFAULT_STATUS_CONCURRENCY: usize = 24;
const MAX_STATUS_CONCURRENCY: usize = 64;
const FALLBACK_MAIN_BRANCH: &str = "main";
const LOG_LIMIT: &str = "-20";

/// Discovers worktrees and aggregates their status through the external `git` tool.
///
/// Per-process caches (main branch, remote URL, divergence by `path:branch`)
/// are owned here rather than held globally.
pub struct GitService<R: CommandRunner = ProcessRunner> {
    runner: Arc<R>,
    repo_dir: Option<PathBuf>,
    status_concurrency: usize,
    main_branch: OnceCell<String>,
    remote_url: OnceCell<Option<String>>,
    divergence: Mutex<HashMap<String, String>>,
}

impl GitService {
    pub fn new(repo_dir: Option<PathBuf>) -> Self {
        Self::with_runner(Arc::new(ProcessRunner), repo_dir)
    }
}

impl<R: CommandRunner> GitService<R> {
    pub fn with_runner(runner: Arc<R>, repo_dir: Option<PathBuf>) -> Self {
        Self {
            runner,
            repo_dir,
            status_concurrency: DEFAULT_STATUS_CONCURRENCY,
            main_branch: OnceCell::new(),
            remote_url: OnceCell::new(),
            divergence: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_status_concurrency(mut self, limit: usize) -> Self {
        self.status_concurrency = limit.clamp(1, MAX_STATUS_CONCURRENCY);
        self
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    pub fn repo_dir(&self) -> Option<&Path> {
        self.repo_dir.as_deref()
    }

    /// Runs a command, defaulting its working directory to the repository.
    pub async fn run(&self, spec: CommandSpec) -> RunOutput {
        let spec = match (&spec.cwd, &self.repo_dir) {
            (None, Some(dir)) => spec.cwd(dir),
            _ => spec,
        };
        self.runner.run(&spec).await
    }

    /// Full enumeration pass: discovery, batched activity lookup, bounded
    /// concurrent status enrichment. Returns `None` when discovery itself
    /// failed, which is distinct from a repository with no worktrees.
    pub async fn list_worktrees(&self) -> Option<Vec<WorktreeRecord>> {
        let mut records = self.discover().await?;

        let (activity, statuses) =
            tokio::join!(self.branch_activity(), self.collect_statuses(&records));

        for record in &mut records {
            if let Some(a) = activity.get(&record.branch) {
                record.last_active = a.relative.clone();
                record.last_active_epoch = a.epoch;
            }
            match statuses.get(&record.path).copied().flatten() {
                Some(counts) => {
                    record.ahead = counts.ahead;
                    record.behind = counts.behind;
                    record.untracked = counts.untracked;
                    record.modified = counts.modified;
                    record.staged = counts.staged;
                    record.status_known = true;
                }
                None => record.status_known = false,
            }
            if let Some(div) = self.cached_divergence(record) {
                record.divergence = div;
            }
        }

        Some(records)
    }

    pub async fn discover(&self) -> Option<Vec<WorktreeRecord>> {
        let out = self
            .run(CommandSpec::git(["worktree", "list", "--porcelain"]))
            .await;
        match out.text() {
            Some(text) => Some(parse::parse_worktree_list(text)),
            None => {
                tracing::warn!("worktree discovery failed: {}", out.failure_reason());
                None
            }
        }
    }

    pub async fn branch_activity(&self) -> HashMap<String, parse::Activity> {
        let out = self
            .run(CommandSpec::git(["for-each-ref", ACTIVITY_FORMAT, "refs/heads"]))
            .await;
        out.text().map(parse::parse_activity).unwrap_or_default()
    }

    async fn collect_statuses(
        &self,
        records: &[WorktreeRecord],
    ) -> HashMap<PathBuf, Option<StatusCounts>> {
        stream::iter(records.iter().map(|r| r.path.clone()))
            .map(|path| async move {
                let counts = self.status_counts(&path).await;
                (path, counts)
            })
            .buffer_unordered(self.status_concurrency)
            .collect()
            .await
    }

    /// `None` when the status query failed; an empty successful result is clean.
    pub async fn status_counts(&self, path: &Path) -> Option<StatusCounts> {
        let out = self
            .run(CommandSpec::git(["status", "--porcelain=v2", "--branch"]).cwd(path))
            .await;
        match out.text() {
            Some(text) => Some(parse::parse_status_v2(text)),
            None => {
                tracing::warn!(
                    "status query failed for {}: {}",
                    path.display(),
                    out.failure_reason()
                );
                None
            }
        }
    }

    pub async fn main_branch(&self) -> String {
        self.main_branch
            .get_or_init(|| async {
                let out = self
                    .run(CommandSpec::git([
                        "symbolic-ref",
                        "--short",
                        "refs/remotes/origin/HEAD",
                    ]))
                    .await;
                out.text()
                    .filter(|s| !s.is_empty())
                    .map(|s| s.split_once('/').map(|(_, b)| b).unwrap_or(s).to_string())
                    .unwrap_or_else(|| FALLBACK_MAIN_BRANCH.to_string())
            })
            .await
            .clone()
    }

    pub async fn main_worktree_path(&self) -> Option<PathBuf> {
        self.discover()
            .await?
            .into_iter()
            .find(|r| r.is_primary)
            .map(|r| r.path)
    }

    pub async fn remote_url(&self) -> Option<String> {
        self.remote_url
            .get_or_init(|| async {
                let out = self
                    .run(CommandSpec::git(["remote", "get-url", "origin"]))
                    .await;
                out.text().filter(|s| !s.is_empty()).map(str::to_string)
            })
            .await
            .clone()
    }

    pub async fn toplevel(&self) -> Option<PathBuf> {
        let out = self
            .run(CommandSpec::git(["rev-parse", "--show-toplevel"]))
            .await;
        out.text().filter(|s| !s.is_empty()).map(PathBuf::from)
    }

    fn divergence_key(record: &WorktreeRecord) -> String {
        format!("{}:{}", record.path.display(), record.branch)
    }

    fn cached_divergence(&self, record: &WorktreeRecord) -> Option<String> {
        self.divergence
            .lock()
            .ok()?
            .get(&Self::divergence_key(record))
            .cloned()
    }

    /// Lazily computes the offset from the main branch. Empty for the primary
    /// worktree and when the count cannot be determined.
    pub async fn divergence(&self, record: &WorktreeRecord) -> String {
        if record.is_primary {
            return String::new();
        }
        if let Some(cached) = self.cached_divergence(record) {
            return cached;
        }
        if !record.divergence.is_empty() {
            return record.divergence.clone();
        }

        let main = self.main_branch().await;
        let out = self
            .run(
                CommandSpec::git(["rev-list", "--left-right", "--count"])
                    .args([format!("{main}...HEAD")])
                    .cwd(&record.path),
            )
            .await;
        let Some((behind, ahead)) = out.text().and_then(parse::parse_left_right) else {
            return String::new();
        };

        let text = parse::format_divergence(behind, ahead);
        if let Ok(mut cache) = self.divergence.lock() {
            cache.insert(Self::divergence_key(record), text.clone());
        }
        text
    }

    pub async fn short_status(&self, path: &Path) -> Vec<ShortStatusLine> {
        let out = self
            .run(CommandSpec::git(["status", "--short"]).cwd(path).raw())
            .await;
        out.text().map(parse::parse_short_status).unwrap_or_default()
    }

    pub async fn recent_commits(&self, path: &Path) -> Vec<CommitLine> {
        let out = self
            .run(CommandSpec::git(["log", LOG_LIMIT, "--pretty=format:%h%x09%s"]).cwd(path))
            .await;
        out.text().map(parse::parse_log).unwrap_or_default()
    }

    /// Header of one commit, or `None` when `sha` does not resolve.
    pub async fn commit_info(&self, path: &Path, sha: &str) -> Option<CommitInfo> {
        let out = self
            .run(
                CommandSpec::git(["show", "-s", parse::COMMIT_INFO_FORMAT, sha])
                    .cwd(path)
                    .raw(),
            )
            .await;
        out.text().and_then(parse::parse_commit_info)
    }

    pub async fn fetch_all(&self) -> RunOutput {
        self.run(CommandSpec::git(["fetch", "--all", "--quiet"]).raw())
            .await
    }
}
