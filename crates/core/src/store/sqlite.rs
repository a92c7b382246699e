//! SQLite-backed key-value store.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for performance and concurrency (WAL mode), and running migrations. The
//! store holds whole serialized blobs under a handful of keys, so the schema
//! is a single `kv` table.

use super::{KeyValueStore, StoreError, migrations};
use async_trait::async_trait;
use std::path::Path;
use tokio_rusqlite::{Connection, params};

/// Durable key-value store handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Writes are checked against a byte budget
/// over the summed value sizes, modelling the quota a browser profile
/// imposes on local storage.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    conn: Connection,
    budget: usize,
}

impl SqliteStore {
    /// Open a store at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>, budget: usize) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await.map_err(|e| StoreError::Database(e.into()))?;
        Self::init(conn, budget).await
    }

    /// Open an in-memory store for testing.
    ///
    /// Creates a temporary in-memory SQLite database with the same
    /// pragma configuration as file-based databases.
    pub async fn open_in_memory(budget: usize) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Self::init(conn, budget).await
    }

    async fn init(conn: Connection, budget: usize) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;",
            )?;
            Ok(())
        })
        .await
        .map_err(StoreError::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn, budget })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, StoreError> {
                let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;

                let result = stmt.query_row(params![key], |row| row.get(0));

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(StoreError::from)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        let budget = self.budget;
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                // Budget counts every value except the one being replaced.
                let others: i64 = conn
                    .query_row(
                        "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM kv WHERE key != ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .map_err(StoreError::from)?;

                let attempted = others as usize + value.len();
                if attempted > budget {
                    return Err(StoreError::QuotaExceeded { attempted, budget });
                }

                conn.execute(
                    "INSERT INTO kv (key, value, updated_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, value, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }
}
