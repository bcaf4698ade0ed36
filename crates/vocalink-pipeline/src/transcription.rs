//! Transcription stage: inbound audio frames to finalized utterance text.

use crate::error::ProviderError;
use crate::provider::SpeechToText;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Per-session transcription stage.
///
/// Thin fan-in over the streaming speech-to-text provider: frames go in as
/// they arrive, finalized utterances come out on the channel handed to
/// [`start`](Self::start). Provider errors are logged inside the provider's
/// pump task and swallowed — a dropped utterance produces no event and is
/// never escalated to the session controller.
pub struct TranscriptionStage {
    frames: mpsc::Sender<String>,
    pump: JoinHandle<()>,
}

impl TranscriptionStage {
    /// Opens the provider stream for one session.
    pub async fn start(
        provider: Arc<dyn SpeechToText>,
        utterances: mpsc::Sender<String>,
    ) -> Result<Self, ProviderError> {
        let stream = provider.open_stream(utterances).await?;
        Ok(Self {
            frames: stream.frames,
            pump: stream.task,
        })
    }

    /// Forwards one opaque inbound audio frame. A full queue drops the
    /// frame with a warning rather than blocking the transport reader.
    pub fn send(&self, payload: String) {
        if let Err(err) = self.frames.try_send(payload) {
            warn!(error = %err, "dropping inbound audio frame");
        }
    }

    /// Stops the provider pump. Frames sent afterwards are dropped.
    pub fn shutdown(&self) {
        self.pump.abort();
    }
}

impl Drop for TranscriptionStage {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
