//! Provider client for citeflow.
//!
//! This crate provides the generative-search provider boundary: the
//! streaming provider trait and its HTTP implementation, the citation
//! annotator, and the stream coordinator that reconciles an incremental
//! token stream with a single deferred annotated response.

pub mod citations;
pub mod provider;
pub mod stream;

pub use citations::annotate;
pub use provider::{EventStream, GenAiClient, GenAiConfig, GenerateRequest, GenerativeProvider, ProviderError, StreamEvent};
pub use stream::{ChunkError, StreamCoordinator, StreamOutcome, StreamSession, TextChunk};
