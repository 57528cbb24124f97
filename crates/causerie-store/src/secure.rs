//! Device-local secure storage backends.
//!
//! [`MemorySecureStore`] backs tests and simulations. [`FileSecureStore`]
//! persists a single JSON map in the platform data directory and stands in
//! for an OS keychain: same `get`/`set` contract, confidential to the
//! device, not durable across reinstall.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use directories::ProjectDirs;

use crate::error::{Result, StoreError};
use crate::traits::SecureStore;

/// In-memory secure store. Clones share the same entries, modelling one
/// device.
#[derive(Clone, Default)]
pub struct MemorySecureStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed secure store: one JSON object per device, rewritten on every
/// `set`.
pub struct FileSecureStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileSecureStore {
    /// Open (or create) the store in the platform-appropriate data
    /// directory:
    /// - Linux:   `~/.local/share/causerie/secure_store.json`
    /// - macOS:   `~/Library/Application Support/com.causerie.causerie/secure_store.json`
    /// - Windows: `{FOLDERID_RoamingAppData}\causerie\causerie\data\secure_store.json`
    pub fn open_default() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "causerie", "causerie").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Self::open_at(&data_dir.join("secure_store.json"))
    }

    /// Open (or create) a store at an explicit path. Useful for tests and
    /// custom directory layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            HashMap::new()
        };

        tracing::info!(path = %path.display(), "opened secure store");

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let snapshot = {
            let mut entries = self.lock();
            entries.insert(key.to_string(), value.to_string());
            entries.clone()
        };
        self.persist(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_get_set_round_trip() {
        let store = MemorySecureStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("conversation-key:abc", "key-material").await.unwrap();
        assert_eq!(
            store.get("conversation-key:abc").await.unwrap().as_deref(),
            Some("key-material")
        );
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secure_store.json");

        {
            let store = FileSecureStore::open_at(&path).unwrap();
            store.set("a", "1").await.unwrap();
            store.set("b", "2").await.unwrap();
        }

        let store = FileSecureStore::open_at(&path).unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secure_store.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileSecureStore::open_at(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
