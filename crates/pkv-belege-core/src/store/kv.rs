//! Durable string key-value storage.
//!
//! The application keeps everything it persists (records, settings, backup
//! and update bookkeeping) under a handful of opaque string keys. The file
//! implementation keeps all keys in a single JSON document that is replaced
//! atomically, so a batch written with `set_many` lands all-or-nothing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::StoreError;

/// Records collection.
pub const KEY_RECORDS: &str = "pkv-belege";
/// Settings object.
pub const KEY_SETTINGS: &str = "pkv-einstellungen";
/// Timestamp of the last exported backup.
pub const KEY_LAST_BACKUP: &str = "pkv-last-backup";
/// Cache manager version last observed by the application.
pub const KEY_LAST_VERSION: &str = "pkv-last-version";
/// Calendar date of the last update check.
pub const KEY_LAST_UPDATE_CHECK: &str = "pkv-last-update-check";

/// Storage file name inside the data directory
const STORAGE_FILE: &str = "storage.json";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write several keys in one step. Either all values are stored or none.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.set_many(&[(key, value)])
    }
}

impl<K: KeyValueStore + ?Sized> KeyValueStore for Arc<K> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        (**self).set_many(entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Key-value store backed by one JSON file.
pub struct FileKvStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: RwLock<()>,
}

impl FileKvStore {
    pub fn new(data_dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            path: data_dir.join(STORAGE_FILE),
            write_lock: RwLock::new(()),
        })
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            key: STORAGE_FILE.to_string(),
            source,
        })
    }

    fn write_all(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(map).map_err(|source| StoreError::Encode {
            key: STORAGE_FILE.to_string(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.write_lock.read().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let _guard = self.write_lock.write().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_all()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        self.write_all(&map)?;
        debug!(keys = entries.len(), path = ?self.path, "Persisted storage batch");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.write().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_all()?;
        if map.remove(key).is_some() {
            self.write_all(&map)?;
        }
        Ok(())
    }
}

/// In-memory key-value store, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored key and value.
    pub fn dump(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set_many(&self, batch: &[(&str, String)]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for (key, value) in batch {
            entries.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}
