use serde::Deserialize;

use crate::exec::CommandSpec;
use crate::models::{ReviewRecord, ReviewState};

use super::HostKind;

const LIST_LIMIT: &str = "100";

/// One hosting provider's way of listing review requests. Adding a host means
/// adding an adapter; callers never branch on the host themselves.
pub trait ReviewAdapter: Send + Sync {
    fn list_command(&self) -> CommandSpec;

    /// Parses the bulk listing into `(source branch, record)` pairs.
    /// `None` means the payload was not understood.
    fn parse(&self, output: &str) -> Option<Vec<(String, ReviewRecord)>>;
}

pub fn adapter_for(host: HostKind) -> Option<Box<dyn ReviewAdapter>> {
    match host {
        HostKind::GitHub => Some(Box::new(GitHubAdapter)),
        HostKind::GitLab => Some(Box::new(GitLabAdapter)),
        HostKind::Unknown => None,
    }
}

pub struct GitHubAdapter;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    head_ref_name: String,
    state: String,
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

impl ReviewAdapter for GitHubAdapter {
    fn list_command(&self) -> CommandSpec {
        CommandSpec::new("gh").args([
            "pr",
            "list",
            "--state",
            "all",
            "--json",
            "headRefName,state,number,title,url",
            "--limit",
            LIST_LIMIT,
        ])
    }

    fn parse(&self, output: &str) -> Option<Vec<(String, ReviewRecord)>> {
        let prs: Vec<GhPullRequest> = serde_json::from_str(output).ok()?;
        Some(
            prs.into_iter()
                .filter_map(|pr| {
                    let state = ReviewState::normalize(&pr.state)?;
                    Some((
                        pr.head_ref_name,
                        ReviewRecord {
                            id: pr.number,
                            state,
                            title: pr.title,
                            url: pr.url,
                        },
                    ))
                })
                .collect(),
        )
    }
}

pub struct GitLabAdapter;

#[derive(Deserialize)]
struct GlabMergeRequest {
    source_branch: String,
    state: String,
    iid: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    web_url: String,
}

impl ReviewAdapter for GitLabAdapter {
    fn list_command(&self) -> CommandSpec {
        CommandSpec::new("glab").args(["api", "merge_requests?state=all&per_page=100"])
    }

    fn parse(&self, output: &str) -> Option<Vec<(String, ReviewRecord)>> {
        let mrs: Vec<GlabMergeRequest> = serde_json::from_str(output).ok()?;
        Some(
            mrs.into_iter()
                .filter_map(|mr| {
                    let state = ReviewState::normalize(&mr.state)?;
                    Some((
                        mr.source_branch,
                        ReviewRecord {
                            id: mr.iid,
                            state,
                            title: mr.title,
                            url: mr.web_url,
                        },
                    ))
                })
                .collect(),
        )
    }
}
