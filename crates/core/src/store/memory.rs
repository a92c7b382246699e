//! In-memory key-value store.
//!
//! The injected fake used by tests and ephemeral runs. Behaves like the
//! SQLite store, byte budget included, so quota recovery paths can be
//! exercised without a database.

use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// `HashMap`-backed store with the same quota behavior as [`super::SqliteStore`].
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    budget: usize,
}

impl MemoryStore {
    /// Create a store with an effectively unlimited budget.
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()), budget: usize::MAX }
    }

    /// Create a store that rejects writes past `budget` total value bytes.
    pub fn with_budget(budget: usize) -> Self {
        Self { entries: Mutex::new(HashMap::new()), budget }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let others: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len())
            .sum();

        let attempted = others + value.len();
        if attempted > self.budget {
            return Err(StoreError::QuotaExceeded { attempted, budget: self.budget });
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}
