//! Session Storage - key/value persistence for the session record
//!
//! The console persists credentials under plain string keys. Two backends are
//! provided: a directory of files (one file per key) and an in-memory map.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vetdesk_core::{storage_error, VetdeskResult};

/// String key/value persistence used by the session store
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent
    fn get(&self, key: &str) -> VetdeskResult<Option<String>>;

    /// Replace the value under `key`; readers see either the old or the new value
    fn set(&self, key: &str, value: &str) -> VetdeskResult<()>;

    /// Remove `key`; removing an absent key succeeds
    fn remove(&self, key: &str) -> VetdeskResult<()>;
}

/// File-backed storage: each key is a file inside `storage_dir`
pub struct FileKeyValueStore {
    storage_dir: PathBuf,
}

impl FileKeyValueStore {
    /// Create a new file storage, creating the directory if needed
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> VetdeskResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&storage_dir).map_err(|e| {
            storage_error!(
                format!("Failed to create {}", storage_dir.display()),
                "file_key_value_store",
                e
            )
        })?;

        info!("Session storage initialized at: {}", storage_dir.display());

        Ok(Self { storage_dir })
    }

    fn key_path(&self, key: &str) -> VetdeskResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

        if !valid {
            return Err(storage_error!(
                format!("Invalid storage key: {:?}", key),
                "file_key_value_store"
            ));
        }

        Ok(self.storage_dir.join(key))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> VetdeskResult<Option<String>> {
        let path = self.key_path(key)?;

        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error!(
                format!("Failed to read {}", path.display()),
                "file_key_value_store",
                e
            )),
        }
    }

    fn set(&self, key: &str, value: &str) -> VetdeskResult<()> {
        let path = self.key_path(key)?;
        let tmp_path = self.storage_dir.join(format!(".{}.tmp", key));

        // Write then rename so the swap is atomic for concurrent readers
        std::fs::write(&tmp_path, value).map_err(|e| {
            storage_error!(
                format!("Failed to write {}", tmp_path.display()),
                "file_key_value_store",
                e
            )
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| {
            storage_error!(
                format!("Failed to replace {}", path.display()),
                "file_key_value_store",
                e
            )
        })?;

        debug!("Saved {} to {}", key, path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> VetdeskResult<()> {
        let path = self.key_path(key)?;

        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error!(
                format!("Failed to delete {}", path.display()),
                "file_key_value_store",
                e
            )),
        }
    }
}

/// In-memory storage for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. with a legacy layout
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Snapshot of the stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> VetdeskResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> VetdeskResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> VetdeskResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("session")).unwrap();

        assert_eq!(store.get("vetdesk.session").unwrap(), None);

        store.set("vetdesk.session", "{\"a\":1}").unwrap();
        assert_eq!(
            store.get("vetdesk.session").unwrap().as_deref(),
            Some("{\"a\":1}")
        );

        store.set("vetdesk.session", "{\"a\":2}").unwrap();
        assert_eq!(
            store.get("vetdesk.session").unwrap().as_deref(),
            Some("{\"a\":2}")
        );

        store.remove("vetdesk.session").unwrap();
        store.remove("vetdesk.session").unwrap();
        assert_eq!(store.get("vetdesk.session").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path()).unwrap();

        assert!(store.set("../escape", "x").is_err());
        assert!(store.get("a/b").is_err());
        assert!(store.remove("").is_err());
    }
}
