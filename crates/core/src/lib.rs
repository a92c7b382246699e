//! Core types and shared functionality for citeflow.
//!
//! This crate provides:
//! - The key-value persistence boundary (SQLite-backed and in-memory)
//! - The content-addressed response cache with TTL eviction
//! - The daily usage ledger
//! - Grounded response types shared across crates
//! - Unified error types and layered configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod grounding;
pub mod store;
pub mod usage;

pub use cache::ContentCache;
pub use config::AppConfig;
pub use error::Error;
pub use grounding::{AnnotatedResponse, GroundingChunk, GroundingMetadata, GroundingSupport, Segment};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreError};
pub use usage::{UsageLedger, UsageSummary};
