use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ReviewRecord;

/// Branch name reported for detached or bare worktrees.
pub const DETACHED_BRANCH: &str = "(detached)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeRecord {
    pub path: PathBuf,
    pub branch: String,
    pub is_primary: bool,
    pub ahead: u32,
    pub behind: u32,
    pub last_active: String,
    pub last_active_epoch: i64,
    pub untracked: u32,
    pub modified: u32,
    pub staged: u32,
    pub divergence: String,
    /// False when the status query failed and the counts are placeholders.
    pub status_known: bool,
    pub review: Option<ReviewRecord>,
}

impl WorktreeRecord {
    pub fn new(path: impl Into<PathBuf>, branch: impl Into<String>, is_primary: bool) -> Self {
        Self {
            path: path.into(),
            branch: branch.into(),
            is_primary,
            ahead: 0,
            behind: 0,
            last_active: String::new(),
            last_active_epoch: 0,
            untracked: 0,
            modified: 0,
            staged: 0,
            divergence: String::new(),
            status_known: false,
            review: None,
        }
    }

    pub fn dirty(&self) -> bool {
        self.untracked + self.modified + self.staged > 0
    }

    pub fn is_detached(&self) -> bool {
        self.branch == DETACHED_BRANCH
    }

    /// Directory name of the worktree, exported to hooks as `WORKTREE_NAME`.
    pub fn dir_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn matches_filter(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.branch.to_lowercase().contains(&query)
            || self.path.to_string_lossy().to_lowercase().contains(&query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    LastActive,
    Path,
}

pub fn sort_records(records: &mut [WorktreeRecord], order: SortOrder) {
    match order {
        SortOrder::LastActive => records.sort_by(|a, b| {
            b.last_active_epoch
                .cmp(&a.last_active_epoch)
                .then_with(|| a.path.cmp(&b.path))
        }),
        SortOrder::Path => records.sort_by(|a, b| a.path.cmp(&b.path)),
    }
}

pub fn find_record<'a>(records: &'a [WorktreeRecord], path: &Path) -> Option<&'a WorktreeRecord> {
    records.iter().find(|r| r.path == path)
}

/// Snapshot projection of a record. Review data is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedWorktree {
    pub path: PathBuf,
    pub branch: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub ahead: u32,
    #[serde(default)]
    pub behind: u32,
    #[serde(default)]
    pub last_active: String,
    #[serde(default)]
    pub last_active_epoch: i64,
    #[serde(default)]
    pub untracked: u32,
    #[serde(default)]
    pub modified: u32,
    #[serde(default)]
    pub staged: u32,
    #[serde(default)]
    pub divergence: String,
    #[serde(default = "status_known_default")]
    pub status_known: bool,
}

fn status_known_default() -> bool {
    true
}

impl From<&WorktreeRecord> for CachedWorktree {
    fn from(record: &WorktreeRecord) -> Self {
        Self {
            path: record.path.clone(),
            branch: record.branch.clone(),
            is_primary: record.is_primary,
            dirty: record.dirty(),
            ahead: record.ahead,
            behind: record.behind,
            last_active: record.last_active.clone(),
            last_active_epoch: record.last_active_epoch,
            untracked: record.untracked,
            modified: record.modified,
            staged: record.staged,
            divergence: record.divergence.clone(),
            status_known: record.status_known,
        }
    }
}

impl From<CachedWorktree> for WorktreeRecord {
    fn from(cached: CachedWorktree) -> Self {
        Self {
            path: cached.path,
            branch: cached.branch,
            is_primary: cached.is_primary,
            ahead: cached.ahead,
            behind: cached.behind,
            last_active: cached.last_active,
            last_active_epoch: cached.last_active_epoch,
            untracked: cached.untracked,
            modified: cached.modified,
            staged: cached.staged,
            divergence: cached.divergence,
            status_known: cached.status_known,
            review: None,
        }
    }
}
