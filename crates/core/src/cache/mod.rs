//! Content-addressed response cache.
//!
//! Maps a normalized query string to a previously computed annotated
//! response, keyed by a SHA-256 digest, with TTL-based invalidation. The
//! whole store round-trips as one JSON blob through a single key-value slot:
//!
//! - Expired entries are evicted lazily on read and eagerly once at open
//! - A corrupt or unreadable blob degrades to an empty store
//! - A write rejected on quota evicts expired entries and retries once;
//!   a second failure drops the write (caching is best-effort, never fatal)

pub mod hash;

pub use hash::cache_key;

use crate::grounding::AnnotatedResponse;
use crate::store::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The key-value slot holding the serialized cache map.
const CACHE_SLOT: &str = "citeflow_response_cache";

/// One stored response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    payload: AnnotatedResponse,
    created_at: DateTime<Utc>,
}

/// A cache hit with its write timestamp, for consumers that display
/// response age.
#[derive(Debug, Clone)]
pub struct CachedHit {
    pub payload: AnnotatedResponse,
    pub created_at: DateTime<Utc>,
}

/// One entry as reported by [`ContentCache::list_all`].
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub payload: AnnotatedResponse,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    pub count: usize,
    pub oldest_created_at: Option<DateTime<Utc>>,
    pub newest_created_at: Option<DateTime<Utc>>,
}

/// Persistent, content-addressed response cache with TTL eviction.
#[derive(Clone)]
pub struct ContentCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ContentCache {
    /// Open the cache over an injected store and sweep expired entries once.
    pub async fn open(store: Arc<dyn KeyValueStore>, ttl_secs: u64) -> Self {
        let cache = Self { store, ttl: Duration::seconds(ttl_secs as i64) };
        let removed = cache.clear_expired().await;
        if removed > 0 {
            tracing::debug!(removed, "purged expired cache entries at open");
        }
        cache
    }

    fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(created_at) > self.ttl
    }

    /// Read the whole store map. Absent, unreadable, or corrupt blobs all
    /// degrade to an empty map.
    async fn load(&self) -> HashMap<String, CacheEntry> {
        let blob = match self.store.get(CACHE_SLOT).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return HashMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read cache store, treating as empty");
                return HashMap::new();
            }
        };

        match serde_json::from_str(&blob) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = %e, "corrupt cache store, treating as empty");
                HashMap::new()
            }
        }
    }

    /// Persist the whole store map. On quota rejection, evict expired
    /// entries and retry once; a second failure drops the write.
    async fn persist(&self, map: &mut HashMap<String, CacheEntry>, now: DateTime<Utc>) {
        let blob = match serde_json::to_string(map) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize cache store");
                return;
            }
        };

        match self.store.set(CACHE_SLOT, &blob).await {
            Ok(()) => return,
            Err(e) if e.is_quota() => {
                tracing::warn!(error = %e, "cache write over quota, evicting expired entries");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to write cache store");
                return;
            }
        }

        map.retain(|_, entry| !self.is_expired(entry.created_at, now));
        let blob = match serde_json::to_string(map) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize cache store");
                return;
            }
        };
        if let Err(e) = self.store.set(CACHE_SLOT, &blob).await {
            tracing::warn!(error = %e, "cache write failed after eviction, dropping entry");
        }
    }

    /// Look up a cached response for a query.
    pub async fn get(&self, query: &str) -> Option<AnnotatedResponse> {
        self.get_with_timestamp(query).await.map(|hit| hit.payload)
    }

    /// Look up a cached response together with its write timestamp.
    pub async fn get_with_timestamp(&self, query: &str) -> Option<CachedHit> {
        self.get_with_timestamp_at(query, Utc::now()).await
    }

    async fn get_with_timestamp_at(&self, query: &str, now: DateTime<Utc>) -> Option<CachedHit> {
        let key = cache_key(query);
        let mut map = self.load().await;

        let entry = map.get(&key)?;
        if self.is_expired(entry.created_at, now) {
            map.remove(&key);
            self.persist(&mut map, now).await;
            return None;
        }

        tracing::debug!(key = %key, "cache hit");
        let entry = map.remove(&key)?;
        Some(CachedHit { payload: entry.payload, created_at: entry.created_at })
    }

    /// Store a response for a query, overwriting any previous entry.
    pub async fn put(&self, query: &str, payload: &AnnotatedResponse) {
        self.put_at(query, payload, Utc::now()).await;
    }

    async fn put_at(&self, query: &str, payload: &AnnotatedResponse, now: DateTime<Utc>) {
        let key = cache_key(query);
        let mut map = self.load().await;
        map.insert(key, CacheEntry { payload: payload.clone(), created_at: now });
        self.persist(&mut map, now).await;
    }

    /// Delete expired entries. Returns the number removed.
    pub async fn clear_expired(&self) -> u64 {
        self.clear_expired_at(Utc::now()).await
    }

    async fn clear_expired_at(&self, now: DateTime<Utc>) -> u64 {
        let mut map = self.load().await;
        let initial = map.len();
        map.retain(|_, entry| !self.is_expired(entry.created_at, now));
        let removed = (initial - map.len()) as u64;

        if removed > 0 {
            self.persist(&mut map, now).await;
            tracing::debug!(removed, "cleaned up expired cache entries");
        }

        removed
    }

    /// Remove every entry.
    pub async fn clear_all(&self) {
        if let Err(e) = self.store.remove(CACHE_SLOT).await {
            tracing::warn!(error = %e, "failed to clear cache store");
        }
    }

    /// Every stored entry with its key and timestamp, unfiltered by TTL.
    pub async fn list_all(&self) -> Vec<CacheRecord> {
        self.load()
            .await
            .into_iter()
            .map(|(key, entry)| CacheRecord { key, created_at: entry.created_at, payload: entry.payload })
            .collect()
    }

    /// Aggregate statistics over the stored entries.
    pub async fn info(&self) -> CacheInfo {
        let map = self.load().await;
        let timestamps: Vec<DateTime<Utc>> = map.values().map(|entry| entry.created_at).collect();

        CacheInfo {
            count: map.len(),
            oldest_created_at: timestamps.iter().min().copied(),
            newest_created_at: timestamps.iter().max().copied(),
        }
    }
}
