//! Durable key-value store
//!
//! Process-wide string store the frequency-cap ledger is built on. Callers
//! share one store behind an `Arc` across every slot in the process.
//!
//! # Backends
//!
//! - [`MemoryStore`] - in-process map, for tests and ephemeral hosts
//! - [`JsonFileStore`] - one JSON object on disk, rewritten atomically

use crate::result::{AdSlotError, AdSlotResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Async get/set/delete of opaque string values
///
/// All operations are idempotent. Concurrent writes to the same key are
/// last-write-wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` if never set or deleted
    async fn get(&self, key: &str) -> AdSlotResult<Option<String>>;

    /// Write a value
    async fn set(&self, key: &str, value: &str) -> AdSlotResult<()>;

    /// Remove a value; removing an absent key succeeds
    async fn delete(&self, key: &str) -> AdSlotResult<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> AdSlotResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> AdSlotResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> AdSlotResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// File-backed store holding every entry in a single JSON object
///
/// The file is read on first access and rewritten through a sibling
/// temporary file and a rename, so a crash mid-write leaves the previous
/// contents intact. A missing file is an empty store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: tokio::sync::Mutex<Option<BTreeMap<String, String>>>,
}

impl JsonFileStore {
    /// Create a store persisting to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: tokio::sync::Mutex::new(None),
        }
    }

    /// Backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> AdSlotResult<BTreeMap<String, String>> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> AdSlotResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `mutate` to the loaded map and persist the result
    async fn update<F>(&self, key: &str, mutate: F) -> AdSlotResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send,
    {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(
                Self::load(&self.path)
                    .await
                    .map_err(|e| AdSlotError::storage(key, e.to_string()))?,
            );
        }
        let mut next = guard.clone().unwrap_or_default();
        mutate(&mut next);
        self.persist(&next)
            .await
            .map_err(|e| AdSlotError::storage(key, e.to_string()))?;
        *guard = Some(next);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> AdSlotResult<Option<String>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(
                Self::load(&self.path)
                    .await
                    .map_err(|e| AdSlotError::storage(key, e.to_string()))?,
            );
        }
        Ok(guard.as_ref().and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> AdSlotResult<()> {
        let (k, v) = (key.to_string(), value.to_string());
        self.update(key, move |entries| {
            entries.insert(k, v);
        })
        .await
    }

    async fn delete(&self, key: &str) -> AdSlotResult<()> {
        let k = key.to_string();
        self.update(key, move |entries| {
            entries.remove(&k);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod memory_store_tests {
        use super::*;

        #[tokio::test]
        async fn test_get_absent_is_none() {
            let store = MemoryStore::new();
            assert_eq!(store.get("missing").await.unwrap(), None);
            assert!(store.is_empty());
        }

        #[tokio::test]
        async fn test_set_overwrites() {
            let store = MemoryStore::new();
            store.set("k", "1").await.unwrap();
            store.set("k", "2").await.unwrap();
            assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
            assert_eq!(store.len(), 1);
        }

        #[tokio::test]
        async fn test_delete_is_idempotent() {
            let store = MemoryStore::new();
            store.set("k", "v").await.unwrap();
            store.delete("k").await.unwrap();
            store.delete("k").await.unwrap();
            assert_eq!(store.get("k").await.unwrap(), None);
        }
    }

    mod json_file_store_tests {
        use super::*;

        #[tokio::test]
        async fn test_missing_file_is_empty() {
            let dir = tempfile::tempdir().unwrap();
            let store = JsonFileStore::new(dir.path().join("absent.json"));
            assert_eq!(store.get("counter:1").await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_values_survive_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("store.json");

            let store = JsonFileStore::new(&path);
            store.set("counter:9", "true").await.unwrap();
            store.set("last-tracker:9", "abc").await.unwrap();
            store.delete("last-tracker:9").await.unwrap();
            drop(store);

            let reopened = JsonFileStore::new(&path);
            assert_eq!(
                reopened.get("counter:9").await.unwrap().as_deref(),
                Some("true")
            );
            assert_eq!(reopened.get("last-tracker:9").await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_corrupt_file_is_storage_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("store.json");
            std::fs::write(&path, b"{not json").unwrap();

            let store = JsonFileStore::new(&path);
            let err = store.get("counter:1").await.unwrap_err();
            assert!(matches!(err, AdSlotError::Storage { .. }));
        }

        #[tokio::test]
        async fn test_no_temp_file_left_behind() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("store.json");
            let store = JsonFileStore::new(&path);
            store.set("a", "b").await.unwrap();
            assert!(path.exists());
            assert!(!path.with_extension("tmp").exists());
        }
    }
}
