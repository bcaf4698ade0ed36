//! Provider traits: the seams between the pipeline and its external
//! collaborators.
//!
//! Each boundary is deliberately minimal — opaque frames in / utterance text
//! out for speech-to-text, role-tagged turns in / token stream out for
//! generative text, text in / audio bytes out for synthesis. Everything
//! provider-specific (framing, encoding, endpoints) lives behind these
//! traits in `vocalink-providers`.

use crate::error::{ProviderError, TransportError};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vocalink_types::{Turn, VoiceSelector};

/// One increment of a streamed completion: zero or more characters of reply
/// text, plus the finish signal.
#[derive(Debug, Clone, Default)]
pub struct CompletionDelta {
    pub content: String,
    pub finished: bool,
}

impl CompletionDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finished: false,
        }
    }

    pub fn finish() -> Self {
        Self {
            content: String::new(),
            finished: true,
        }
    }
}

/// Streamed reply from the generative-text boundary.
pub type CompletionStream = BoxStream<'static, Result<CompletionDelta, ProviderError>>;

/// Generative-text boundary: ordered role-tagged turns in, token stream out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Opens a streamed completion over the conversation so far.
    async fn stream_completion(&self, turns: &[Turn]) -> Result<CompletionStream, ProviderError>;
}

/// Handle to one live transcription stream.
///
/// Audio frames are pushed into `frames`; the pump task forwards them to
/// the provider and emits finalized utterances until it is aborted or the
/// frame sender is dropped.
pub struct SttStream {
    pub frames: mpsc::Sender<String>,
    pub task: JoinHandle<()>,
}

/// Speech-to-text boundary: opaque audio frames in, finalized utterances
/// out. Provider errors are logged inside the pump task and swallowed — a
/// dropped utterance simply produces no event.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Opens a streaming transcription session; finalized utterances are
    /// delivered on `utterances`.
    async fn open_stream(
        &self,
        utterances: mpsc::Sender<String>,
    ) -> Result<SttStream, ProviderError>;
}

/// Text-to-speech boundary: text plus a voice selector in, audio bytes out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceSelector)
        -> Result<Vec<u8>, ProviderError>;
}

/// Outbound half of the transport leg: "send this audio unit, associated
/// with this label". The label is echoed back by the transport as a mark
/// event once the audio has finished playing.
#[async_trait]
pub trait TransportSink: Send + Sync {
    async fn send_audio(
        &self,
        stream_sid: &str,
        payload: &[u8],
        label: &str,
    ) -> Result<(), TransportError>;
}
