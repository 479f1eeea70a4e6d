mod debounce;
mod diff;
mod lifecycle;
mod orchestrator;
mod state;

pub use diff::DiffText;
pub use orchestrator::{CommitDetail, Engine, WorktreeDetail};
pub use state::{RefreshOutcome, ReviewStatus, WorktreeState};
