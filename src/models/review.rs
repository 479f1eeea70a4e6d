use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewState {
    Open,
    Merged,
    Closed,
}

impl ReviewState {
    /// Maps provider-specific state names onto the three shared states.
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" | "opened" => Some(ReviewState::Open),
            "merged" => Some(ReviewState::Merged),
            "closed" | "locked" => Some(ReviewState::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Open => "OPEN",
            ReviewState::Merged => "MERGED",
            ReviewState::Closed => "CLOSED",
        }
    }
}

/// A pull request or merge request attached to a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: u64,
    pub state: ReviewState,
    pub title: String,
    pub url: String,
}
