use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::git::DEFAULT_STATUS_CONCURRENCY;
use crate::trust::TrustMode;
use crate::utils::expand_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub worktree_dir: Option<String>,
    pub trust_mode: TrustMode,
    pub auto_fetch_reviews: bool,
    pub sort_by_active: bool,
    pub max_untracked_diffs: usize,
    pub max_diff_chars: usize,
    pub status_concurrency: usize,
    pub detail_debounce_ms: u64,
    pub diff_highlighter: Vec<String>,
    #[serde(deserialize_with = "crate::trust::deserialize_command_list")]
    pub init_commands: Vec<String>,
    #[serde(deserialize_with = "crate::trust::deserialize_command_list")]
    pub terminate_commands: Vec<String>,
    pub debug_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worktree_dir: None,
            trust_mode: TrustMode::Ask,
            auto_fetch_reviews: true,
            sort_by_active: true,
            max_untracked_diffs: 10,
            max_diff_chars: 200_000,
            status_concurrency: DEFAULT_STATUS_CONCURRENCY,
            detail_debounce_ms: 100,
            diff_highlighter: vec![
                "delta".to_string(),
                "--no-gitconfig".to_string(),
                "--paging=never".to_string(),
            ],
            init_commands: Vec::new(),
            terminate_commands: Vec::new(),
            debug_log: None,
        }
    }
}

impl Config {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let path = config_path.unwrap_or_else(Self::default_config_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn default_config_path() -> PathBuf {
        if let Some(config_path) = std::env::var_os("WTDECK_CONFIG") {
            PathBuf::from(config_path)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("wtdeck")
                .join("config.yaml")
        }
    }

    pub fn with_worktree_dir(mut self, dir: Option<String>) -> Self {
        if dir.is_some() {
            self.worktree_dir = dir;
        }
        self
    }

    pub fn with_debug_log(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.debug_log = path;
        }
        self
    }

    /// Root directory for new worktrees and per-repository state.
    pub fn resolved_worktree_dir(&self) -> PathBuf {
        match &self.worktree_dir {
            Some(dir) if !dir.trim().is_empty() => expand_home(dir.trim()),
            _ => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("worktrees"),
        }
    }

    pub fn repo_state_dir(&self, repo_key: &str) -> PathBuf {
        self.resolved_worktree_dir().join(repo_key)
    }
}
