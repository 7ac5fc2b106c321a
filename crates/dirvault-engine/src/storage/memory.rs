//! In-memory storage backend for tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::core::error::Result;
use crate::host::StorageBackend;

/// In-memory implementation of [`StorageBackend`] with the host's
/// hierarchical list semantics.
pub struct MemoryStorage {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create a new in-memory store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Arc::new(DashMap::new()),
        })
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys, sorted. Test helper.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut children: Vec<String> = Vec::new();
        for entry in self.entries.iter() {
            let key = entry.key();
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let child = match rest.find('/') {
                Some(slash) => format!("{}/", &rest[..slash]),
                None => rest.to_string(),
            };
            if !children.contains(&child) {
                children.push(child);
            }
        }
        children.sort();
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());

        storage.put("config", b"{}".to_vec()).await.unwrap();
        assert_eq!(storage.get("config").await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(storage.get("missing").await.unwrap(), None);

        storage.delete("config").await.unwrap();
        assert!(storage.is_empty());

        // Deleting a missing key succeeds.
        storage.delete("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_returns_immediate_children() {
        let storage = MemoryStorage::new();
        for key in [
            "static-role/app",
            "static-role/team/app1",
            "static-role/team/app2",
            "static-role/zeta",
            "library/unrelated",
        ] {
            storage.put(key, b"{}".to_vec()).await.unwrap();
        }

        let children = storage.list("static-role/").await.unwrap();
        assert_eq!(children, vec!["app", "team/", "zeta"]);

        let nested = storage.list("static-role/team/").await.unwrap();
        assert_eq!(nested, vec!["app1", "app2"]);

        assert!(storage.list("none/").await.unwrap().is_empty());
    }
}
