use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("unable to persist cache to `{path}`")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to encode cache contents")]
    Encode(#[from] serde_json::Error),
}

/// Best-effort key-value mirror of the application state, persisted as one
/// JSON document. The cache never fails its callers: unreadable files are
/// discarded on open and write errors are logged and dropped.
pub struct CacheStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, Value>>,
}

impl CacheStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "discarding unreadable cache file");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.read();
        let value = entries.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let encoded = match serde_json::to_value(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(key, %err, "value not cacheable");
                return;
            }
        };
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), encoded);
        if let Err(err) = self.persist(&entries) {
            tracing::warn!(key, %err, "cache write skipped");
        }
    }

    pub fn remove(&self, key: &str) {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            if let Err(err) = self.persist(&entries) {
                tracing::warn!(key, %err, "cache write skipped");
            }
        }
    }

    fn persist(&self, entries: &HashMap<String, Value>) -> Result<(), CacheError> {
        let raw = serde_json::to_string(entries)?;
        fs::write(&self.path, raw).map_err(|source| CacheError::Persist {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_then_get_round_trips_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("habito.json");

        let store = CacheStore::open(&path);
        store.set("habito.habits", &vec!["run".to_string(), "read".to_string()]);

        let reopened = CacheStore::open(&path);
        let habits: Vec<String> = reopened.get("habito.habits").unwrap();
        assert_eq!(habits, vec!["run".to_string(), "read".to_string()]);
    }

    #[test]
    fn corrupt_cache_file_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("habito.json");
        fs::write(&path, "{not json").unwrap();

        let store = CacheStore::open(&path);
        assert!(store.get::<Vec<String>>("habito.habits").is_none());
    }

    #[test]
    fn missing_keys_and_type_mismatches_yield_none() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("habito.json"));
        store.set("habito.todos", &42u32);
        assert!(store.get::<Vec<String>>("habito.todos").is_none());
        assert!(store.get::<u32>("habito.absent").is_none());
    }

    #[test]
    fn remove_drops_the_entry() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("habito.json"));
        store.set("habito.groups", &1u32);
        store.remove("habito.groups");
        assert!(store.get::<u32>("habito.groups").is_none());
    }
}
