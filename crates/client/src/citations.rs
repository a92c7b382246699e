//! Inline citation insertion.
//!
//! Merges out-of-band grounding metadata into response text: each support
//! span gets a markdown-link suffix naming its sources, inserted right after
//! the span's end offset.
//!
//! Supports are applied in descending end-offset order against the original,
//! unshifted offset space. Inserting at a later position never moves an
//! insertion still to be made at an earlier one, which is what keeps the
//! offsets valid; mixing pre- and post-insertion offsets would corrupt the
//! text. Ties on end offset are applied sequentially in stable order.

use citeflow_core::grounding::{GroundingChunk, GroundingSupport};

/// Insert citation markers into `text` from grounding metadata.
///
/// Display indices are 1-based chunk indices; chunks without a usable
/// source URI are dropped, and a support whose links all drop contributes
/// nothing. Malformed or missing metadata yields the text unchanged; this
/// function never fails.
pub fn annotate(text: &str, supports: &[GroundingSupport], chunks: &[GroundingChunk]) -> String {
    if supports.is_empty() || chunks.is_empty() {
        return text.to_string();
    }

    let mut ordered: Vec<&GroundingSupport> = supports
        .iter()
        .filter(|s| s.segment.is_some() && !s.source_indices.is_empty())
        .collect();
    // Stable sort, highest end offset first.
    ordered.sort_by(|a, b| {
        let end_a = a.segment.as_ref().map(|s| s.end_offset).unwrap_or(0);
        let end_b = b.segment.as_ref().map(|s| s.end_offset).unwrap_or(0);
        end_b.cmp(&end_a)
    });

    let mut out = text.to_string();
    for support in ordered {
        let Some(segment) = &support.segment else { continue };
        // Offsets past the end append at the end; offsets inside a
        // multi-byte character are unusable and skip the support.
        let end = segment.end_offset.min(text.len());
        if !text.is_char_boundary(end) {
            continue;
        }

        let links: Vec<String> = support
            .source_indices
            .iter()
            .filter_map(|&i| {
                chunks
                    .get(i)
                    .and_then(|chunk| chunk.source_uri.as_deref())
                    .filter(|uri| !uri.is_empty())
                    .map(|uri| format!("[{}]({})", i + 1, uri))
            })
            .collect();

        if links.is_empty() {
            continue;
        }

        out.insert_str(end, &format!(" {}", links.join(", ")));
    }

    out
}
