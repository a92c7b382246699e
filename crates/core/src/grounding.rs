//! Grounded response types shared by the provider client and the engine.
//!
//! These mirror the shape the generative-search provider reports: a list of
//! source chunks, and support spans tying regions of the response text back
//! to those chunks by index.

use serde::{Deserialize, Serialize};

/// A region of the response text that a support span covers.
///
/// Offsets are byte offsets into the original, un-annotated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(default)]
    pub text: String,
}

/// Ties a text segment to the source chunks that ground it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSupport {
    /// The covered region; absent when the provider omitted boundaries.
    pub segment: Option<Segment>,
    /// Indices into the chunk list, in citation order.
    #[serde(default)]
    pub source_indices: Vec<usize>,
}

/// A single source the provider grounded the response on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Grounding metadata attached to a streamed response.
///
/// May arrive incrementally; the last non-absent value seen during a stream
/// is canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingMetadata {
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub chunks: Vec<GroundingChunk>,
    #[serde(default)]
    pub supports: Vec<GroundingSupport>,
    /// Rendered search-entry-point content, when the provider supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_entry_point: Option<String>,
}

/// A completed response: raw text, citation-annotated text, and the
/// grounding metadata it was built from. Immutable once constructed;
/// this is what the cache stores and the consumer receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedResponse {
    pub text: String,
    pub text_with_citations: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
    #[serde(default)]
    pub grounding_supports: Vec<GroundingSupport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_entry_point: Option<String>,
}

impl AnnotatedResponse {
    /// Build a response with no grounding, both text fields identical.
    ///
    /// Used for notices (not configured, limit reached) and transport
    /// errors, which surface to the consumer as ordinary data.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            text: text.clone(),
            text_with_citations: text,
            search_queries: Vec::new(),
            grounding_chunks: Vec::new(),
            grounding_supports: Vec::new(),
            search_entry_point: None,
        }
    }
}
