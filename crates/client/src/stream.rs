//! Streaming-response coordination.
//!
//! Reconciles the provider's incremental token stream with a single
//! deferred annotated response. One internal driver task owns the
//! accumulator; consumers get two channels backed by it:
//!
//! - a lazy chunk sequence of text deltas, ending in exactly one final chunk
//! - a deferred outcome, awaitable any number of times, resolvable whether
//!   or not the chunk sequence was ever consumed
//!
//! Provider failure surfaces as a final error-marked chunk and an
//! error-flavored response, never as a mid-stream panic or a hung await.
//! Abandoning both handles before the final chunk stops the driver; the
//! coordinator itself never touches the cache or the usage ledger.

use crate::citations::annotate;
use crate::provider::{EventStream, GenerateRequest, GenerativeProvider, ProviderError};
use citeflow_core::grounding::{AnnotatedResponse, GroundingMetadata};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Error marker carried on a final chunk when the stream failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Network or provider failure.
    Transport(String),
}

/// One element of the chunk sequence.
///
/// Non-final chunks carry a strict append to the running accumulation.
/// The final chunk carries no text delta and is delivered exactly once,
/// as the last element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub delta_text: String,
    pub is_final: bool,
    pub error: Option<ChunkError>,
}

impl TextChunk {
    fn delta(text: String) -> Self {
        Self { delta_text: text, is_final: false, error: None }
    }

    fn final_ok() -> Self {
        Self { delta_text: String::new(), is_final: true, error: None }
    }

    fn final_err(error: ChunkError) -> Self {
        Self { delta_text: String::new(), is_final: true, error: Some(error) }
    }
}

/// The resolved end state of one stream session.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub response: AnnotatedResponse,
    /// True only when the provider stream drained normally. An errored
    /// stream is neither cacheable nor chargeable.
    pub completed: bool,
}

/// One open streaming call: the chunk sequence plus the deferred outcome.
pub struct StreamSession {
    chunks: mpsc::UnboundedReceiver<TextChunk>,
    full: watch::Receiver<Option<StreamOutcome>>,
}

impl StreamSession {
    /// Next chunk of the sequence; `None` after the final chunk.
    pub async fn next_chunk(&mut self) -> Option<TextChunk> {
        self.chunks.recv().await
    }

    /// Await the session outcome.
    ///
    /// Resolves even if the chunk sequence is never consumed (the driver
    /// task drains the provider regardless), and can be awaited repeatedly;
    /// every await sees the same resolved value.
    pub async fn full_response(&mut self) -> StreamOutcome {
        match self.full.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => match (*outcome).clone() {
                Some(outcome) => outcome,
                None => Self::terminated(),
            },
            Err(_) => Self::terminated(),
        }
    }

    fn terminated() -> StreamOutcome {
        StreamOutcome {
            response: AnnotatedResponse::plain("Error generating response: stream terminated"),
            completed: false,
        }
    }
}

/// Opens streaming sessions over a provider.
pub struct StreamCoordinator;

impl StreamCoordinator {
    /// Open a streaming generation call.
    ///
    /// An error opening the call still yields an ordinary session: its
    /// sequence holds one final error chunk and its outcome is already
    /// resolved, so downstream code never special-cases the open path.
    pub async fn open(provider: Arc<dyn GenerativeProvider>, request: GenerateRequest) -> StreamSession {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (full_tx, full_rx) = watch::channel(None);

        match provider.stream_generate(&request).await {
            Ok(events) => {
                tokio::spawn(drive(events, chunk_tx, full_tx));
            }
            Err(e) => fail(&chunk_tx, &full_tx, &e),
        }

        StreamSession { chunks: chunk_rx, full: full_rx }
    }
}

/// Drain the provider stream, relaying deltas and retaining the last
/// non-absent grounding metadata, then annotate and resolve.
async fn drive(
    mut events: EventStream,
    chunk_tx: mpsc::UnboundedSender<TextChunk>,
    full_tx: watch::Sender<Option<StreamOutcome>>,
) {
    let mut text = String::new();
    let mut grounding: Option<GroundingMetadata> = None;

    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                if let Some(delta) = event.text {
                    text.push_str(&delta);
                    let _ = chunk_tx.send(TextChunk::delta(delta));
                }
                if let Some(meta) = event.grounding {
                    grounding = Some(meta);
                }
                if chunk_tx.is_closed() && full_tx.is_closed() {
                    tracing::debug!("stream session abandoned, stopping driver");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "provider stream failed");
                fail(&chunk_tx, &full_tx, &e);
                return;
            }
        }
    }

    let meta = grounding.unwrap_or_default();
    let text_with_citations = annotate(&text, &meta.supports, &meta.chunks);
    let response = AnnotatedResponse {
        text,
        text_with_citations,
        search_queries: meta.search_queries,
        grounding_chunks: meta.chunks,
        grounding_supports: meta.supports,
        search_entry_point: meta.search_entry_point,
    };

    let _ = chunk_tx.send(TextChunk::final_ok());
    let _ = full_tx.send(Some(StreamOutcome { response, completed: true }));
}

fn fail(
    chunk_tx: &mpsc::UnboundedSender<TextChunk>,
    full_tx: &watch::Sender<Option<StreamOutcome>>,
    error: &ProviderError,
) {
    let _ = chunk_tx.send(TextChunk::final_err(ChunkError::Transport(error.to_string())));
    let response = AnnotatedResponse::plain(format!("Error generating response: {error}"));
    let _ = full_tx.send(Some(StreamOutcome { response, completed: false }));
}
