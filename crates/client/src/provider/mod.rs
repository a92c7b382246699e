//! Generative-search provider boundary.
//!
//! The engine depends only on the event shape defined here: a stream of
//! text deltas with optional grounding metadata attached. Transport and
//! auth details live entirely behind [`GenerativeProvider`].

pub mod error;
pub mod genai;
pub mod response;

pub use error::ProviderError;
pub use genai::{GenAiClient, GenAiConfig};

use async_trait::async_trait;
use citeflow_core::grounding::GroundingMetadata;
use futures_util::stream::BoxStream;

/// One generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Optional system instructions sent alongside the prompt.
    pub instructions: Option<String>,
    pub model_name: String,
    pub temperature: f64,
}

/// One event off the provider's incremental stream.
///
/// A single event can carry a text delta, grounding metadata, or both;
/// metadata may arrive incrementally or only near the end of the stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    pub text: Option<String>,
    pub grounding: Option<GroundingMetadata>,
}

/// The incremental event stream for one call.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ProviderError>>;

/// A streaming generative-search provider.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Whether a credential is available. Checked before any cache or
    /// quota logic so an unconfigured provider short-circuits cheaply.
    fn is_configured(&self) -> bool;

    /// Open a streaming generation call.
    ///
    /// # Errors
    ///
    /// Returns a `ProviderError` when the call cannot be opened at all;
    /// failures mid-stream surface as `Err` items on the stream instead.
    async fn stream_generate(&self, request: &GenerateRequest) -> Result<EventStream, ProviderError>;
}
