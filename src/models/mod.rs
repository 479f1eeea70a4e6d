mod review;
mod worktree;

pub use review::{ReviewRecord, ReviewState};
pub use worktree::{
    find_record, sort_records, CachedWorktree, SortOrder, WorktreeRecord, DETACHED_BRANCH,
};
