//! Synthesis stage: ordered text segments to audio units.

use crate::event::SessionEvent;
use crate::provider::SpeechSynthesizer;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vocalink_types::{AudioUnit, PartialResponse, VoiceSelector};

/// Per-session synthesis stage.
///
/// Each partial response is rendered in its own task; requests for
/// different indices run concurrently and may complete out of order.
/// Ordering is restored downstream by the playback buffer. A failed
/// synthesis is reported as an error event scoped to its index and does not
/// block the other segments.
pub struct SynthesisStage {
    provider: Arc<dyn SpeechSynthesizer>,
    voice: VoiceSelector,
    audio_tx: mpsc::Sender<AudioUnit>,
    event_tx: mpsc::Sender<SessionEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SynthesisStage {
    pub fn new(
        provider: Arc<dyn SpeechSynthesizer>,
        voice: VoiceSelector,
        audio_tx: mpsc::Sender<AudioUnit>,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            provider,
            voice,
            audio_tx,
            event_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Starts synthesis for one segment.
    pub async fn synthesize(&self, partial: PartialResponse) {
        let provider = self.provider.clone();
        let voice = self.voice.clone();
        let audio_tx = self.audio_tx.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let label = partial.label();
            match provider.synthesize(&partial.text, &voice).await {
                Ok(payload) => {
                    let unit = AudioUnit {
                        index: partial.index,
                        interaction_id: partial.interaction_id,
                        label,
                        payload,
                    };
                    if audio_tx.send(unit).await.is_err() {
                        debug!(index = partial.index, "audio unit dropped, session closed");
                    }
                }
                Err(error) => {
                    warn!(index = partial.index, error = %error, "synthesis failed for segment");
                    let _ = event_tx
                        .send(SessionEvent::SynthesisFailed {
                            index: partial.index,
                            error,
                        })
                        .await;
                }
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Aborts in-flight synthesis. Results arriving after shutdown are
    /// discarded rather than delivered to a torn-down playback buffer.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}
