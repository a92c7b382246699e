//! Provider wire format and normalization.
//!
//! Raw camelCase response types as the generative-search API reports them,
//! converted into the stable grounding model the rest of the system uses.

use citeflow_core::grounding::{GroundingChunk, GroundingMetadata, GroundingSupport, Segment};
use serde::Deserialize;

use super::StreamEvent;

/// One raw streamed response frame.
#[derive(Debug, Deserialize)]
pub(crate) struct RawStreamResponse {
    #[serde(default)]
    pub candidates: Option<Vec<RawCandidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawCandidate {
    #[serde(default)]
    pub content: Option<RawContent>,
    #[serde(default)]
    pub grounding_metadata: Option<RawGroundingMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawContent {
    #[serde(default)]
    pub parts: Option<Vec<RawPart>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawGroundingMetadata {
    #[serde(default)]
    pub web_search_queries: Option<Vec<String>>,
    #[serde(default)]
    pub search_entry_point: Option<RawSearchEntryPoint>,
    #[serde(default)]
    pub grounding_chunks: Option<Vec<RawGroundingChunk>>,
    #[serde(default)]
    pub grounding_supports: Option<Vec<RawGroundingSupport>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSearchEntryPoint {
    #[serde(default)]
    pub rendered_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawGroundingChunk {
    #[serde(default)]
    pub web: Option<RawWebSource>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawWebSource {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawGroundingSupport {
    #[serde(default)]
    pub segment: Option<RawSegment>,
    #[serde(default)]
    pub grounding_chunk_indices: Option<Vec<usize>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSegment {
    #[serde(default)]
    pub start_index: Option<usize>,
    pub end_index: usize,
    #[serde(default)]
    pub text: Option<String>,
}

impl From<RawGroundingMetadata> for GroundingMetadata {
    /// Normalize the raw wire metadata into the internal grounding model.
    fn from(raw: RawGroundingMetadata) -> Self {
        let chunks = raw
            .grounding_chunks
            .unwrap_or_default()
            .into_iter()
            .map(|c| {
                let web = c.web;
                GroundingChunk {
                    source_uri: web.as_ref().and_then(|w| w.uri.clone()),
                    title: web.and_then(|w| w.title),
                }
            })
            .collect();

        let supports = raw
            .grounding_supports
            .unwrap_or_default()
            .into_iter()
            .map(|s| GroundingSupport {
                segment: s.segment.map(|seg| Segment {
                    start_offset: seg.start_index.unwrap_or(0),
                    end_offset: seg.end_index,
                    text: seg.text.unwrap_or_default(),
                }),
                source_indices: s.grounding_chunk_indices.unwrap_or_default(),
            })
            .collect();

        GroundingMetadata {
            search_queries: raw.web_search_queries.unwrap_or_default(),
            chunks,
            supports,
            search_entry_point: raw.search_entry_point.and_then(|e| e.rendered_content),
        }
    }
}

impl RawStreamResponse {
    /// Extract the event this frame carries: the first candidate's joined
    /// part text plus any grounding metadata attached to it.
    pub(crate) fn into_event(self) -> StreamEvent {
        let Some(candidate) = self.candidates.and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
        else {
            return StreamEvent::default();
        };

        let text = candidate
            .content
            .and_then(|content| content.parts)
            .map(|parts| parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .filter(|t| !t.is_empty());

        StreamEvent { text, grounding: candidate.grounding_metadata.map(Into::into) }
    }
}
