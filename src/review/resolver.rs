use std::collections::HashMap;

use tokio::sync::OnceCell;

use crate::exec::CommandRunner;
use crate::git::GitService;
use crate::models::ReviewRecord;

use super::{adapter_for, HostKind};

pub type ReviewMap = HashMap<String, ReviewRecord>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewFetch {
    /// The remote is not on a known host; no provider CLI was invoked.
    Unsupported,
    /// The provider call failed. This is "no data", not "zero reviews".
    Failed(String),
    Loaded(ReviewMap),
}

#[derive(Default)]
pub struct ReviewResolver {
    host: OnceCell<HostKind>,
}

impl ReviewResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn host<R: CommandRunner>(&self, git: &GitService<R>) -> HostKind {
        *self
            .host
            .get_or_init(|| async {
                let host = git
                    .remote_url()
                    .await
                    .map(|url| HostKind::classify(&url))
                    .unwrap_or(HostKind::Unknown);
                tracing::debug!("remote host classified as {}", host.name());
                host
            })
            .await
    }

    /// Fetches every review request in one bulk call, keyed by source branch.
    /// Later entries for the same branch replace earlier ones.
    pub async fn fetch<R: CommandRunner>(&self, git: &GitService<R>) -> ReviewFetch {
        let host = self.host(git).await;
        let Some(adapter) = adapter_for(host) else {
            return ReviewFetch::Unsupported;
        };

        let out = git.run(adapter.list_command()).await;
        let Some(text) = out.text() else {
            let reason = out.failure_reason();
            tracing::warn!("{} review fetch failed: {}", host.name(), reason);
            return ReviewFetch::Failed(reason);
        };

        match adapter.parse(text) {
            Some(entries) => ReviewFetch::Loaded(entries.into_iter().collect()),
            None => {
                tracing::warn!("{} review listing could not be parsed", host.name());
                ReviewFetch::Failed("unrecognised review listing".to_string())
            }
        }
    }
}
