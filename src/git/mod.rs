mod identity;
pub mod parse;
mod service;

pub use identity::resolve_repo_key;
pub use parse::{CommitInfo, CommitLine, ShortStatusLine};
#[cfg(test)]
pub(crate) use service::fixtures;
pub use service::{GitService, DEFAULT_STATUS_CONCURRENCY};
