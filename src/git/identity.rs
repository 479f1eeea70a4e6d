use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::exec::{CommandRunner, CommandSpec};

use super::GitService;

pub const UNKNOWN_REPO: &str = "unknown";

fn owner_repo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[:/]([^/:]+/[^/]+?)(?:\.git)?/?$").expect("owner/repo pattern is valid")
    })
}

/// Extracts `owner/repo` from an https, ssh or scp-style remote URL.
pub fn repo_name_from_url(url: &str) -> Option<String> {
    owner_repo_pattern()
        .captures(url.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Deserialize)]
struct GlabRepo {
    #[serde(default)]
    path_with_namespace: String,
}

/// Resolves the stable key that names this repository's state directory.
///
/// Resolution order:
/// 1. GitHub CLI `nameWithOwner`
/// 2. GitLab CLI `path_with_namespace`
/// 3. `owner/repo` parsed from the origin URL
/// 4. basename of the top-level directory
pub async fn resolve_repo_key<R: CommandRunner>(git: &GitService<R>) -> String {
    let gh = git
        .run(CommandSpec::new("gh").args([
            "repo",
            "view",
            "--json",
            "nameWithOwner",
            "-q",
            ".nameWithOwner",
        ]))
        .await;
    if let Some(name) = gh.text().filter(|s| !s.is_empty()) {
        return name.to_string();
    }

    let glab = git
        .run(CommandSpec::new("glab").args(["repo", "view", "-F", "json"]))
        .await;
    if let Some(repo) = glab
        .text()
        .and_then(|s| serde_json::from_str::<GlabRepo>(s).ok())
        .filter(|r| !r.path_with_namespace.is_empty())
    {
        return repo.path_with_namespace;
    }

    if let Some(name) = git
        .remote_url()
        .await
        .as_deref()
        .and_then(repo_name_from_url)
    {
        return name;
    }

    git.toplevel()
        .await
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN_REPO.to_string())
}
