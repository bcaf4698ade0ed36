//! Pipeline units: partial responses and synthesized audio.

use serde::{Deserialize, Serialize};

/// Maximum length of the human-readable playback label derived from an
/// utterance. Longer utterances are truncated on a char boundary.
const MAX_LABEL_CHARS: usize = 48;

/// One ordered, independently synthesizable segment of a streamed model
/// reply.
///
/// Created by the completion stage, consumed exactly once by the synthesis
/// stage, never mutated after creation. The `index` is strictly increasing
/// within a session and is only reset by an explicit context reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResponse {
    /// Session-scoped sequence index.
    pub index: u64,
    /// Segment text, trimmed.
    pub text: String,
    /// Which caller interaction this segment answers.
    pub interaction_id: u64,
    /// Opaque call reference, once the transport has assigned one.
    pub call_sid: Option<String>,
}

impl PartialResponse {
    /// Derives the playback acknowledgement label for this segment: a
    /// readable snippet of the text, falling back to the index alone when
    /// the text is empty.
    pub fn label(&self) -> String {
        let snippet: String = self.text.chars().take(MAX_LABEL_CHARS).collect();
        if snippet.is_empty() {
            format!("utterance-{}", self.index)
        } else {
            format!("{}:{}", self.index, snippet)
        }
    }
}

/// Synthesized audio for one partial response.
///
/// Carries the same sequence index as its source segment; the playback
/// buffer is the sole owner of delivery ordering and destroys the unit once
/// delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUnit {
    /// Sequence index copied from the source [`PartialResponse`].
    pub index: u64,
    /// Interaction counter value copied from the source segment.
    pub interaction_id: u64,
    /// Playback acknowledgement label.
    pub label: String,
    /// Raw audio payload as returned by the synthesis provider.
    pub payload: Vec<u8>,
}
