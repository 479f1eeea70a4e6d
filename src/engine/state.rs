use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::WorktreeRecord;
use crate::review::ReviewFetch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    /// Nothing has been published yet.
    #[default]
    Empty,
    /// Hydrated from the snapshot cache; not confirmed live.
    Cached,
    Live,
}

/// Outcome of the review-request lookup, kept apart from the records so
/// "fetch failed" is never confused with "no reviews".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    NotRequested,
    Unsupported,
    Failed { reason: String },
    Loaded { count: usize },
}

impl From<&ReviewFetch> for ReviewStatus {
    fn from(fetch: &ReviewFetch) -> Self {
        match fetch {
            ReviewFetch::Unsupported => ReviewStatus::Unsupported,
            ReviewFetch::Failed(reason) => ReviewStatus::Failed {
                reason: reason.clone(),
            },
            ReviewFetch::Loaded(map) => ReviewStatus::Loaded { count: map.len() },
        }
    }
}

/// The collection the engine publishes to its subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeState {
    /// Refresh cycle that produced the records; 0 until the first publish.
    pub generation: u64,
    pub source: StateSource,
    pub records: Vec<WorktreeRecord>,
    pub reviews: ReviewStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorktreeState {
    pub fn primary(&self) -> Option<&WorktreeRecord> {
        self.records.iter().find(|r| r.is_primary)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Published(WorktreeState),
    /// A newer refresh was requested; this cycle's results were dropped.
    Superseded,
    /// Worktree discovery failed; the previous state stays published.
    Unavailable,
}

impl RefreshOutcome {
    pub fn state(&self) -> Option<&WorktreeState> {
        match self {
            RefreshOutcome::Published(state) => Some(state),
            _ => None,
        }
    }
}
