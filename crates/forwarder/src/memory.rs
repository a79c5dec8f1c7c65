//! In-process [`DedupStore`] for tests and single-instance local runs.
//!
//! State lives only as long as the value, so this store gives no protection
//! across replicas. Use the `memcache` adapter in deployment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::{DedupKey, DedupStore, StoreError};

/// A [`DedupStore`] backed by a `HashMap`.
///
/// Cloning shares the underlying map, which lets tests hand one clone to a
/// forwarder and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDedupStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryDedupStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value for `key` without going through the port.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn get(&self, key: &DedupKey) -> Result<Option<String>, StoreError> {
        Ok(self.peek(key.as_str()))
    }

    async fn set(&self, key: &DedupKey, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.as_str().to_owned(), value.to_owned());
        Ok(())
    }

    async fn set_if_not_equal(&self, key: &DedupKey, value: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        if entries.get(key.as_str()).map(String::as_str) == Some(value) {
            return Ok(false);
        }
        entries.insert(key.as_str().to_owned(), value.to_owned());
        Ok(true)
    }
}
