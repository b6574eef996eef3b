//! In-memory key-value storage handler for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use satchel_core::effects::{KeyValueEffects, StorageError};
use tokio::sync::RwLock;

/// In-memory key-value storage with injectable failures.
pub struct MemoryKeyValueStore {
    data: RwLock<HashMap<String, String>>,
    fail_remaining: AtomicUsize,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            fail_remaining: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` operations fail with a storage error.
    pub fn fail_next_operations(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    fn should_fail(&self) -> bool {
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueEffects for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.should_fail() {
            return Err(StorageError::read_failed("injected storage failure"));
        }
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StorageError> {
        if self.should_fail() {
            return Err(StorageError::write_failed("injected storage failure"));
        }
        self.data.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        if self.should_fail() {
            return Err(StorageError::write_failed("injected storage failure"));
        }
        Ok(self.data.write().await.remove(key).is_some())
    }
}
