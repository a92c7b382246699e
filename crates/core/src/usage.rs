//! Daily provider-call usage tracking.
//!
//! A single rolling record `{day, count}` persisted in one key-value slot.
//! The record resets whenever the stored day differs from today, so the
//! count never survives a calendar rollover. Only completed provider calls
//! are recorded; cache hits cost nothing.

use crate::store::{KeyValueStore, StoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The key-value slot holding the serialized usage record.
const USAGE_SLOT: &str = "citeflow_api_usage";

/// The rolling daily record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct UsageRecord {
    day: String,
    count: u32,
}

/// A snapshot of today's usage for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSummary {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

/// Tracks provider calls against a daily allowance.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn KeyValueStore>,
    daily_limit: u32,
    unmetered: bool,
}

impl UsageLedger {
    /// Create a ledger over an injected store.
    ///
    /// `unmetered` disables all accounting: checks report unlimited and
    /// [`record_success`](Self::record_success) is a no-op. It is an
    /// explicit flag so local development can opt out without touching
    /// build configuration.
    pub fn new(store: Arc<dyn KeyValueStore>, daily_limit: u32, unmetered: bool) -> Self {
        Self { store, daily_limit, unmetered }
    }

    /// Today's date in YYYY-MM-DD form.
    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Read the record for `day`, resetting on rollover or failure.
    async fn load_for(&self, day: &str) -> UsageRecord {
        let fresh = UsageRecord { day: day.to_string(), count: 0 };

        let blob = match self.store.get(USAGE_SLOT).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return fresh,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read usage record, treating as fresh");
                return fresh;
            }
        };

        match serde_json::from_str::<UsageRecord>(&blob) {
            Ok(record) if record.day == day => record,
            Ok(_) => fresh,
            Err(e) => {
                tracing::warn!(error = %e, "corrupt usage record, treating as fresh");
                fresh
            }
        }
    }

    async fn save(&self, record: &UsageRecord) -> Result<(), StoreError> {
        let blob = serde_json::to_string(record).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.store.set(USAGE_SLOT, &blob).await
    }

    /// Calls left today. Unlimited in unmetered mode.
    pub async fn remaining_today(&self) -> u32 {
        if self.unmetered {
            return u32::MAX;
        }
        let record = self.load_for(&Self::today()).await;
        self.daily_limit.saturating_sub(record.count)
    }

    /// Whether today's allowance is exhausted. Never true in unmetered mode.
    pub async fn has_reached_limit(&self) -> bool {
        self.has_reached_limit_on(&Self::today()).await
    }

    async fn has_reached_limit_on(&self, day: &str) -> bool {
        if self.unmetered {
            return false;
        }
        let record = self.load_for(day).await;
        record.count >= self.daily_limit
    }

    /// Record one completed provider call. No-op in unmetered mode.
    ///
    /// # Errors
    ///
    /// Returns the store failure when the updated record cannot be
    /// persisted; callers treat this as a degraded write, not a fault.
    pub async fn record_success(&self) -> Result<(), StoreError> {
        self.record_success_on(&Self::today()).await
    }

    async fn record_success_on(&self, day: &str) -> Result<(), StoreError> {
        if self.unmetered {
            return Ok(());
        }
        let mut record = self.load_for(day).await;
        record.count += 1;
        self.save(&record).await
    }

    /// Reset today's count to zero (test/debug only).
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.save(&UsageRecord { day: Self::today(), count: 0 }).await
    }

    /// Used/limit/remaining snapshot for display.
    pub async fn summary(&self) -> UsageSummary {
        self.summary_on(&Self::today()).await
    }

    async fn summary_on(&self, day: &str) -> UsageSummary {
        let used = if self.unmetered { 0 } else { self.load_for(day).await.count };
        UsageSummary { used, limit: self.daily_limit, remaining: self.daily_limit.saturating_sub(used) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger(limit: u32) -> UsageLedger {
        UsageLedger::new(Arc::new(MemoryStore::new()), limit, false)
    }

    #[tokio::test]
    async fn test_fresh_ledger() {
        let ledger = ledger(20);
        assert_eq!(ledger.remaining_today().await, 20);
        assert!(!ledger.has_reached_limit().await);
    }

    #[tokio::test]
    async fn test_record_success_counts_up() {
        let ledger = ledger(20);
        ledger.record_success().await.unwrap();
        ledger.record_success().await.unwrap();

        let summary = ledger.summary().await;
        assert_eq!(summary.used, 2);
        assert_eq!(summary.remaining, 18);
    }

    #[tokio::test]
    async fn test_limit_reached() {
        let ledger = ledger(2);
        ledger.record_success().await.unwrap();
        assert!(!ledger.has_reached_limit().await);
        ledger.record_success().await.unwrap();
        assert!(ledger.has_reached_limit().await);
        assert_eq!(ledger.remaining_today().await, 0);
    }

    #[tokio::test]
    async fn test_day_rollover_resets_count() {
        let ledger = ledger(20);
        ledger.record_success_on("2026-08-25").await.unwrap();
        ledger.record_success_on("2026-08-25").await.unwrap();

        // Next day sees a fresh record.
        assert!(!ledger.has_reached_limit_on("2026-08-26").await);
        assert_eq!(ledger.summary_on("2026-08-26").await.used, 0);

        // And recording on the new day starts from zero.
        ledger.record_success_on("2026-08-26").await.unwrap();
        assert_eq!(ledger.summary_on("2026-08-26").await.used, 1);
    }

    #[tokio::test]
    async fn test_reset() {
        let ledger = ledger(2);
        ledger.record_success().await.unwrap();
        ledger.record_success().await.unwrap();
        assert!(ledger.has_reached_limit().await);

        ledger.reset().await.unwrap();
        assert!(!ledger.has_reached_limit().await);
        assert_eq!(ledger.summary().await.used, 0);
    }

    #[tokio::test]
    async fn test_unmetered_mode() {
        let ledger = UsageLedger::new(Arc::new(MemoryStore::new()), 1, true);

        ledger.record_success().await.unwrap();
        ledger.record_success().await.unwrap();

        assert!(!ledger.has_reached_limit().await);
        assert_eq!(ledger.remaining_today().await, u32::MAX);
        assert_eq!(ledger.summary().await.used, 0);
    }

    #[tokio::test]
    async fn test_corrupt_record_treated_as_fresh() {
        let store = Arc::new(MemoryStore::new());
        store.set(USAGE_SLOT, "not json").await.unwrap();

        let ledger = UsageLedger::new(store, 20, false);
        assert_eq!(ledger.remaining_today().await, 20);
    }
}
