//! Per-call conversational pipeline for the Vocalink platform.
//!
//! One [`SessionController`] per live call turns a continuous inbound audio
//! stream into a continuous, strictly ordered outbound audio stream through
//! a text round trip with a generative model:
//!
//! transport → [`TranscriptionStage`] → [`CompletionStage`] →
//! [`SynthesisStage`] → [`PlaybackBuffer`] → transport
//!
//! Stage hand-offs are bounded channels owned by the session; the external
//! provider boundaries are the traits in [`provider`]. Sessions are fully
//! isolated from each other — closing one never touches another.

pub mod completion;
pub mod context;
pub mod error;
pub mod event;
pub mod playback;
pub mod provider;
pub mod segment;
pub mod session;
pub mod synthesis;
pub mod transcription;

pub use completion::{CompletionConfig, CompletionStage, FALLBACK_RESPONSE};
pub use context::{ConversationContext, RESET_THRESHOLD};
pub use error::{ProviderError, TransportError};
pub use event::SessionEvent;
pub use playback::PlaybackBuffer;
pub use provider::{
    CompletionDelta, CompletionProvider, CompletionStream, SpeechSynthesizer, SpeechToText,
    SttStream, TransportSink,
};
pub use segment::{MarkerSegmenter, SegmenterKind, SentenceSegmenter, UtteranceSegmenter};
pub use session::{SessionConfig, SessionController, SessionProviders, SessionState};
pub use synthesis::SynthesisStage;
pub use transcription::TranscriptionStage;
