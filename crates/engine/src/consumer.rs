//! Callback surface the orchestrator drives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use citeflow_core::AnnotatedResponse;

/// Receives the progressive and final output of one query.
///
/// `on_chunk` is invoked with the cumulative text so far; the final call
/// carries the citation-annotated text and `is_complete = true`. Notices
/// (limit reached, provider unconfigured, transport failure) arrive through
/// the same two callbacks as ordinary text, so implementors never handle a
/// separate error path.
#[async_trait]
pub trait QueryConsumer: Send {
    async fn on_chunk(&mut self, text: &str, is_complete: bool);

    /// Called exactly once per query with the full annotated response.
    /// `cached_at` is set only when the response was replayed from cache.
    async fn on_response(
        &mut self,
        response: &AnnotatedResponse,
        from_cache: bool,
        cached_at: Option<DateTime<Utc>>,
    );
}
