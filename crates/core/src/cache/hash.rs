//! Content-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute a content-addressed cache key for a query.
///
/// The query is normalized (trimmed, lowercased) before hashing, so inputs
/// differing only by case or surrounding whitespace share a key. The key is
/// stable across process restarts.
pub fn cache_key(query: &str) -> String {
    let normalized = query.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
