//! Shared helpers for the integration suites.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use dirvault_engine::core::error::{EngineError, Result};
use dirvault_engine::host::StorageBackend;
use dirvault_engine::storage::memory::MemoryStorage;

/// Storage wrapper that fails writes to selected keys, for driving the
/// engine through partial-failure paths.
pub struct FailingStorage {
    inner: Arc<MemoryStorage>,
    fail_put_keys: Mutex<HashSet<String>>,
}

impl FailingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStorage::new(),
            fail_put_keys: Mutex::new(HashSet::new()),
        })
    }

    /// Make every put to `key` fail until cleared.
    pub fn fail_puts_to(&self, key: &str) {
        self.fail_put_keys.lock().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_put_keys.lock().clear();
    }
}

#[async_trait]
impl StorageBackend for FailingStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.fail_put_keys.lock().contains(key) {
            return Err(EngineError::storage("put", format!("injected failure for {key}")));
        }
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }
}
