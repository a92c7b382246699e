//! Key-value persistence boundary.
//!
//! The cache and the usage ledger both persist through this trait: each owns
//! one slot holding a JSON-serialized blob. The boundary is injected at
//! construction so tests can substitute an in-memory fake, and so storage
//! failures stay local to whoever writes.
//!
//! Two implementations:
//! - [`SqliteStore`] — durable, tokio-rusqlite with WAL mode and migrations
//! - [`MemoryStore`] — `HashMap` behind a mutex, for tests and ephemeral runs
//!
//! Both enforce a byte budget on writes, rejecting with
//! [`StoreError::QuotaExceeded`] when a `set` would push the store past it.

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use tokio_rusqlite::rusqlite;

/// Errors from the key-value persistence boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write would exceed the store's byte budget.
    #[error("quota exceeded: write of {attempted} bytes over {budget} byte budget")]
    QuotaExceeded { attempted: usize, budget: usize },

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// A stored blob failed to serialize or deserialize.
    #[error("corrupt blob: {0}")]
    Corrupt(String),
}

impl From<tokio_rusqlite::Error<StoreError>> for StoreError {
    fn from(err: tokio_rusqlite::Error<StoreError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => StoreError::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => StoreError::Database(tokio_rusqlite::Error::Close(c)),
            _ => StoreError::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StoreError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        StoreError::Database(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl StoreError {
    /// Whether this failure is the storage-quota kind the cache recovers
    /// from by evicting expired entries and retrying.
    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

/// Injected persistence handle: a string-to-string store with three
/// operations. Mirrors what a browser profile's local storage offers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value for a key, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, overwriting any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::QuotaExceeded` when the write would push the
    /// store past its byte budget.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
