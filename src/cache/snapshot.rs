use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use xxhash_rust::xxh3::xxh3_64;

use crate::models::{CachedWorktree, WorktreeRecord};

const CACHE_FILE: &str = ".worktree-cache.json";
const LAST_SELECTED_FILE: &str = ".last-selected";

#[derive(Serialize)]
struct SnapshotOut<'a> {
    worktrees: &'a [CachedWorktree],
}

#[derive(Deserialize)]
struct SnapshotIn {
    #[serde(default)]
    worktrees: Vec<serde_json::Value>,
}

/// Per-repository fast-start snapshot and last-selected marker.
///
/// Advisory only: anything loaded from here is replaced by the next
/// successful live enumeration.
pub struct SnapshotCache {
    state_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotCache {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn cache_path(&self) -> PathBuf {
        self.state_dir.join(CACHE_FILE)
    }

    fn last_selected_path(&self) -> PathBuf {
        self.state_dir.join(LAST_SELECTED_FILE)
    }

    /// `None` when there is no usable cache. Entries that fail to
    /// reconstruct are dropped individually.
    pub async fn load(&self) -> Option<Vec<WorktreeRecord>> {
        let path = self.cache_path();
        let bytes = fs::read(&path).await.ok()?;
        let snapshot: SnapshotIn = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Ignoring corrupt worktree cache {:?}: {}", path, e);
                return None;
            }
        };

        let records = snapshot
            .worktrees
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<CachedWorktree>(entry) {
                Ok(cached) if !cached.path.as_os_str().is_empty() => Some(cached.into()),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!("Skipping cache entry: {}", e);
                    None
                }
            })
            .collect();
        Some(records)
    }

    pub fn encode(records: &[WorktreeRecord]) -> Result<Vec<u8>> {
        let worktrees: Vec<CachedWorktree> = records.iter().map(CachedWorktree::from).collect();
        let mut bytes = serde_json::to_vec_pretty(&SnapshotOut {
            worktrees: &worktrees,
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Writes the snapshot. Returns `false` when the file already held the
    /// same bytes and nothing was written.
    pub async fn save(&self, records: &[WorktreeRecord]) -> Result<bool> {
        let bytes = Self::encode(records)?;
        let path = self.cache_path();

        let _guard = self.write_lock.lock().await;
        if let Ok(existing) = fs::read(&path).await {
            if xxh3_64(&existing) == xxh3_64(&bytes) {
                return Ok(false);
            }
        }

        fs::create_dir_all(&self.state_dir)
            .await
            .with_context(|| format!("Failed to create state dir: {:?}", self.state_dir))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("Failed to write worktree cache: {:?}", tmp))?;
        fs::rename(&tmp, &path).await?;
        Ok(true)
    }

    pub async fn last_selected(&self) -> Option<PathBuf> {
        let content = fs::read_to_string(self.last_selected_path()).await.ok()?;
        let line = content.trim();
        (!line.is_empty()).then(|| PathBuf::from(line))
    }

    pub async fn save_last_selected(&self, worktree: &Path) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.state_dir).await?;
        fs::write(
            self.last_selected_path(),
            format!("{}\n", worktree.display()),
        )
        .await
        .context("Failed to write last-selected marker")?;
        Ok(())
    }
}
