//! Voice selector for the text-to-speech boundary.
//!
//! A [`VoiceSelector`] names the provider voice an agent speaks with plus
//! the tuning knobs the synthesis provider accepts. The selected voice is
//! read from the records boundary at session start; the default is used when
//! no record exists.

use serde::{Deserialize, Serialize};

/// Voice configuration for one call session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSelector {
    /// Provider voice identifier (possibly a cloned-voice id).
    pub voice_id: String,
    /// Synthesis model identifier.
    pub model_id: String,
    /// Voice stability (0.0–1.0, provider semantics).
    pub stability: f32,
    /// Similarity boost (0.0–1.0, provider semantics).
    pub similarity_boost: f32,
}

impl Default for VoiceSelector {
    fn default() -> Self {
        Self {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_turbo_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

impl VoiceSelector {
    /// Builds a selector for a specific voice with default tuning.
    pub fn for_voice(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            ..Self::default()
        }
    }
}
