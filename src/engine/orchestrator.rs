use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, OnceCell};

use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::exec::{CommandRunner, ProcessRunner};
use crate::git::{resolve_repo_key, CommitInfo, CommitLine, GitService, ShortStatusLine};
use crate::models::{find_record, WorktreeRecord};
use crate::review::{ReviewFetch, ReviewMap, ReviewResolver};
use crate::trust::{TrustGate, TrustRequest, TrustStore};

use super::debounce::Debouncer;
use super::diff::{DiffBuilder, DiffOptions, DiffText};
use super::state::{RefreshOutcome, ReviewStatus, StateSource, WorktreeState};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// `<worktree_dir>/<repo_key>`: new worktrees and the snapshot live here.
    pub worktree_root: PathBuf,
    pub auto_fetch_reviews: bool,
    pub diff: DiffOptions,
    pub detail_debounce: Duration,
    pub init_commands: Vec<String>,
    pub terminate_commands: Vec<String>,
}

impl EngineSettings {
    pub fn from_config(config: &Config, repo_key: &str) -> Self {
        Self {
            worktree_root: config.repo_state_dir(repo_key),
            auto_fetch_reviews: config.auto_fetch_reviews,
            diff: DiffOptions {
                max_untracked: config.max_untracked_diffs,
                max_chars: config.max_diff_chars,
                highlighter: config.diff_highlighter.clone(),
            },
            detail_debounce: Duration::from_millis(config.detail_debounce_ms),
            init_commands: config.init_commands.clone(),
            terminate_commands: config.terminate_commands.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeDetail {
    pub path: PathBuf,
    pub status: Vec<ShortStatusLine>,
    pub commits: Vec<CommitLine>,
    pub divergence: String,
    pub diff: DiffText,
}

/// One commit of a worktree: its header and the patch it introduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDetail {
    pub info: Option<CommitInfo>,
    pub diff: DiffText,
}

#[derive(Default)]
struct ReviewSession {
    status: ReviewStatus,
    reviews: ReviewMap,
}

/// The worktree state engine: refresh orchestration, review session state,
/// detail and diff queries, and (in `lifecycle`) mutating operations.
pub struct Engine<R: CommandRunner = ProcessRunner> {
    pub(super) git: GitService<R>,
    pub(super) trust: TrustGate,
    pub(super) settings: EngineSettings,
    resolver: ReviewResolver,
    cache: SnapshotCache,
    generation: AtomicU64,
    commit: tokio::sync::Mutex<()>,
    state: watch::Sender<WorktreeState>,
    review_session: Mutex<ReviewSession>,
    /// Set once the session's automatic review lookup has finished.
    reviews_loaded: OnceCell<()>,
    details: Debouncer,
}

impl Engine {
    /// Wires the engine for the repository at `repo_dir` (or the current
    /// directory) using the real process runner.
    pub async fn open(
        config: &Config,
        repo_dir: Option<PathBuf>,
        prompts: Option<mpsc::Sender<TrustRequest>>,
    ) -> Self {
        let git = GitService::new(repo_dir).with_status_concurrency(config.status_concurrency);
        let repo_key = resolve_repo_key(&git).await;
        tracing::debug!("repository key: {}", repo_key);
        let trust = TrustGate::new(
            config.trust_mode,
            TrustStore::load(TrustStore::default_path()),
            prompts,
        );
        Self::with_parts(git, EngineSettings::from_config(config, &repo_key), trust)
    }
}

impl<R: CommandRunner> Engine<R> {
    pub fn with_parts(git: GitService<R>, settings: EngineSettings, trust: TrustGate) -> Self {
        let details = Debouncer::new(settings.detail_debounce);
        Self {
            cache: SnapshotCache::new(settings.worktree_root.clone()),
            git,
            trust,
            settings,
            resolver: ReviewResolver::new(),
            generation: AtomicU64::new(0),
            commit: tokio::sync::Mutex::new(()),
            state: watch::Sender::new(WorktreeState::default()),
            review_session: Mutex::new(ReviewSession::default()),
            reviews_loaded: OnceCell::new(),
            details,
        }
    }

    pub fn git(&self) -> &GitService<R> {
        &self.git
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<WorktreeState> {
        self.state.subscribe()
    }

    /// The currently published state.
    pub fn snapshot(&self) -> WorktreeState {
        self.state.borrow().clone()
    }

    pub(super) fn published_record(&self, path: &Path) -> Option<WorktreeRecord> {
        find_record(&self.state.borrow().records, path).cloned()
    }

    pub(super) fn published_primary(&self) -> Option<WorktreeRecord> {
        self.state.borrow().primary().cloned()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Runs one refresh cycle. Requesting another refresh while this one is
    /// in flight makes this one's results void.
    pub async fn refresh(&self) -> RefreshOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, "refresh requested");

        self.hydrate_from_cache().await;

        let Some(mut records) = self.git.list_worktrees().await else {
            return RefreshOutcome::Unavailable;
        };

        {
            let _commit = self.commit.lock().await;
            if !self.is_current(generation) {
                tracing::debug!(generation, "refresh superseded before persisting");
                return RefreshOutcome::Superseded;
            }
            if let Err(e) = self.cache.save(&records).await {
                tracing::warn!("Failed to persist worktree cache: {:#}", e);
            }
        }

        if self.settings.auto_fetch_reviews {
            // A newer cycle waits for the lookup an older cycle started.
            self.reviews_loaded
                .get_or_init(|| async {
                    self.load_reviews().await;
                })
                .await;
        }
        let reviews = self.attach_session_reviews(&mut records);

        let published = self.state.send_if_modified(|state| {
            if !self.is_current(generation) || generation < state.generation {
                return false;
            }
            *state = WorktreeState {
                generation,
                source: StateSource::Live,
                records,
                reviews,
                updated_at: Some(Utc::now()),
            };
            true
        });

        if published {
            RefreshOutcome::Published(self.snapshot())
        } else {
            tracing::debug!(generation, "refresh superseded before publishing");
            RefreshOutcome::Superseded
        }
    }

    async fn hydrate_from_cache(&self) {
        if self.state.borrow().source != StateSource::Empty {
            return;
        }
        let Some(records) = self.cache.load().await else {
            return;
        };
        self.state.send_if_modified(|state| {
            if state.source != StateSource::Empty {
                return false;
            }
            state.records = records;
            state.source = StateSource::Cached;
            true
        });
    }

    async fn load_reviews(&self) -> ReviewStatus {
        let fetch = self.resolver.fetch(&self.git).await;
        let status = ReviewStatus::from(&fetch);
        let mut session = self
            .review_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        session.status = status.clone();
        if let ReviewFetch::Loaded(map) = fetch {
            session.reviews = map;
        }
        status
    }

    fn attach_session_reviews(&self, records: &mut [WorktreeRecord]) -> ReviewStatus {
        let session = self
            .review_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for record in records.iter_mut() {
            record.review = if record.is_detached() {
                None
            } else {
                session.reviews.get(&record.branch).cloned()
            };
        }
        session.status.clone()
    }

    /// Re-runs the provider lookup and re-attaches the results to the
    /// published records. A failed lookup keeps earlier results attached
    /// but reports the failure.
    pub async fn fetch_reviews(&self) -> ReviewStatus {
        let _ = self.reviews_loaded.set(());
        let status = self.load_reviews().await;
        self.state.send_modify(|state| {
            state.reviews = self.attach_session_reviews(&mut state.records);
        });
        status
    }

    pub async fn diff(&self, path: &Path) -> DiffText {
        DiffBuilder::new(&self.git, &self.settings.diff).build(path).await
    }

    pub async fn raw_diff(&self, path: &Path) -> String {
        DiffBuilder::new(&self.git, &self.settings.diff)
            .assemble(path)
            .await
    }

    /// Detail view of a published worktree.
    pub async fn detail(&self, path: &Path) -> Option<WorktreeDetail> {
        let record = self.published_record(path)?;
        let (status, commits, divergence) = tokio::join!(
            self.git.short_status(&record.path),
            self.git.recent_commits(&record.path),
            self.git.divergence(&record),
        );
        let diff = if status.is_empty() {
            DiffText::default()
        } else {
            self.diff(&record.path).await
        };
        Some(WorktreeDetail {
            path: record.path,
            status,
            commits,
            divergence,
            diff,
        })
    }

    /// Commit view for `sha` in a published worktree. `None` when the
    /// worktree is unknown or git has nothing for the commit.
    pub async fn commit_detail(&self, path: &Path, sha: &str) -> Option<CommitDetail> {
        let record = self.published_record(path)?;
        let builder = DiffBuilder::new(&self.git, &self.settings.diff);
        let (info, diff) = tokio::join!(
            self.git.commit_info(&record.path, sha),
            builder.commit_patch(&record.path, sha),
        );
        if info.is_none() && diff.text.is_empty() {
            return None;
        }
        Some(CommitDetail { info, diff })
    }

    /// Debounced selection change: returns `None` when a newer selection
    /// arrived before this one settled or finished.
    pub async fn select(&self, path: &Path) -> Option<WorktreeDetail> {
        let ticket = self.details.begin();
        if !self.details.settle(ticket).await {
            return None;
        }
        if let Err(e) = self.cache.save_last_selected(path).await {
            tracing::warn!("{:#}", e);
        }
        let detail = self.detail(path).await?;
        self.details.is_current(ticket).then_some(detail)
    }

    pub async fn remember_selection(&self, path: &Path) -> anyhow::Result<()> {
        self.cache.save_last_selected(path).await
    }

    pub async fn last_selected(&self) -> Option<PathBuf> {
        self.cache.last_selected().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::exec::FakeRunner;
    use crate::trust::TrustMode;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub struct Harness {
        pub dir: TempDir,
        pub fake: Arc<FakeRunner>,
        pub engine: Engine<FakeRunner>,
    }

    pub fn harness(fake: FakeRunner, mode: TrustMode, prompts: Option<mpsc::Sender<TrustRequest>>) -> Harness {
        let dir = TempDir::new().unwrap();
        let fake = Arc::new(fake);
        let settings = EngineSettings {
            worktree_root: dir.path().join("worktrees").join("o").join("r"),
            auto_fetch_reviews: true,
            diff: DiffOptions::default(),
            detail_debounce: Duration::from_millis(20),
            init_commands: Vec::new(),
            terminate_commands: Vec::new(),
        };
        let trust = TrustGate::new(
            mode,
            TrustStore::load(dir.path().join("trusted.json")),
            prompts,
        );
        let engine = Engine::with_parts(GitService::with_runner(fake.clone(), None), settings, trust);
        Harness { dir, fake, engine }
    }

    /// Porcelain worktree listing for the given (path, branch) pairs.
    pub fn porcelain(worktrees: &[(&Path, &str)]) -> String {
        worktrees
            .iter()
            .enumerate()
            .map(|(i, (path, branch))| {
                format!(
                    "worktree {}\nHEAD {:040}\nbranch refs/heads/{}\n",
                    path.display(),
                    i,
                    branch
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
