#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    GitHub,
    GitLab,
    Unknown,
}

impl HostKind {
    /// Classifies a remote URL by the provider brand token in its host name,
    /// which also covers enterprise and self-hosted instances.
    pub fn classify(remote_url: &str) -> Self {
        let host = host_of(remote_url).to_ascii_lowercase();
        if host.contains("github") {
            HostKind::GitHub
        } else if host.contains("gitlab") {
            HostKind::GitLab
        } else {
            HostKind::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostKind::GitHub => "github",
            HostKind::GitLab => "gitlab",
            HostKind::Unknown => "unknown",
        }
    }
}

/// Host part of `scheme://[user@]host[:port]/path` or `user@host:path`.
fn host_of(url: &str) -> &str {
    let url = url.trim();
    let rest = match url.split_once("://") {
        Some((_, rest)) => rest,
        None => url,
    };
    let rest = rest.split_once('@').map(|(_, h)| h).unwrap_or(rest);
    rest.split(['/', ':']).next().unwrap_or("")
}
