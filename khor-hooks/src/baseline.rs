//! Baseline persistence for delta predicates
//!
//! A JSON map on disk, cached in memory. Writes go through a temp file and
//! rename so a crash never leaves a torn baseline file.

use crate::error::{HookError, HookResult};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct BaselineStore {
    path: PathBuf,
    cache: DashMap<String, String>,
}

impl BaselineStore {
    /// Open (or start) the baseline map at `path`
    pub fn open(path: impl Into<PathBuf>) -> HookResult<Self> {
        let path = path.into();
        let cache = DashMap::new();
        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let map: BTreeMap<String, String> = serde_json::from_str(&text)
                .map_err(|e| HookError::Io(format!("corrupt baseline store: {}", e)))?;
            for (key, value) in map {
                cache.insert(key, value);
            }
        }
        Ok(Self { path, cache })
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.cache.get(id).map(|entry| entry.value().clone())
    }

    /// Store a baseline hash and persist the whole map
    pub fn set(&self, id: &str, hash: &str) -> HookResult<()> {
        self.cache.insert(id.to_string(), hash.to_string());
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn persist(&self) -> HookResult<()> {
        let map: BTreeMap<String, String> = self
            .cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let text = serde_json::to_string_pretty(&map)
            .map_err(|e| HookError::Io(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn set_then_get_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/baselines.json");
        let store = BaselineStore::open(&path).unwrap();
        store.set("hook-a", "abc123").unwrap();
        drop(store);

        let reopened = BaselineStore::open(&path).unwrap();
        assert_eq!(reopened.get("hook-a").as_deref(), Some("abc123"));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::open(dir.path().join("none.json")).unwrap();
        assert!(store.is_empty());
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(BaselineStore::open(&path).is_err());
    }
}
