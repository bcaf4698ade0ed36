//! Session controller: one instance per live call.
//!
//! Owns the call lifecycle, wires the four stages together with bounded
//! channels, routes inbound transport events, and guarantees ordered,
//! idempotent teardown. There is no global registry: every channel and task
//! here is scoped to one session and dies with it.

use crate::completion::{CompletionConfig, CompletionStage};
use crate::event::SessionEvent;
use crate::playback::PlaybackBuffer;
use crate::provider::{CompletionProvider, SpeechSynthesizer, SpeechToText, TransportSink};
use crate::synthesis::SynthesisStage;
use crate::transcription::TranscriptionStage;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vocalink_types::{CallIds, StartMeta, TransportEvent, VoiceSelector};

/// Default capacity of the stage hand-off queues.
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Lifecycle states of one call session. There is no transition out of
/// `Closed`; a new call is always a new controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
    Streaming,
    Closed,
}

/// The three provider boundaries a session talks to.
#[derive(Clone)]
pub struct SessionProviders {
    pub speech_to_text: Arc<dyn SpeechToText>,
    pub completion: Arc<dyn CompletionProvider>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Per-session configuration, resolved at connection time from server
/// config and the records lookup.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Standing instructions for the model, including any caller context.
    pub system_instruction: String,
    /// The scripted assistant opening that seeds the history.
    pub greeting: String,
    /// Voice the session speaks with.
    pub voice: VoiceSelector,
    /// Completion stage tuning.
    pub completion: CompletionConfig,
    /// Capacity of the bounded stage hand-off queues.
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_instruction: "You are a helpful voice assistant on a phone call. \
                Respond in less than ten words at a time and add a '•' after \
                every complete thought so your reply can be spoken as it is written."
                .to_string(),
            greeting: "Hello! How can I help you today?".to_string(),
            voice: VoiceSelector::default(),
            completion: CompletionConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Controller for one call session.
pub struct SessionController {
    state: SessionState,
    ids: Option<CallIds>,
    speech_to_text: Arc<dyn SpeechToText>,
    completion: CompletionStage,
    synthesis: Arc<SynthesisStage>,
    playback: Arc<Mutex<PlaybackBuffer>>,
    transcription: Option<TranscriptionStage>,
    utterance_tx: mpsc::Sender<String>,
    routers: Vec<JoinHandle<()>>,
}

impl SessionController {
    /// Builds the stage graph for one session and spawns its routing
    /// tasks. Nothing touches a provider until the transport's `start`
    /// event arrives.
    pub fn new(
        providers: SessionProviders,
        sink: Arc<dyn TransportSink>,
        config: SessionConfig,
    ) -> Self {
        let (utterance_tx, mut utterance_rx) = mpsc::channel::<String>(config.queue_capacity);
        let (partial_tx, mut partial_rx) = mpsc::channel(config.queue_capacity);
        let (audio_tx, mut audio_rx) = mpsc::channel(config.queue_capacity);
        let (event_tx, mut event_rx) = mpsc::channel(config.queue_capacity);

        let completion = CompletionStage::new(
            providers.completion,
            partial_tx,
            event_tx.clone(),
            config.system_instruction,
            config.greeting,
            config.completion,
        );
        let synthesis = Arc::new(SynthesisStage::new(
            providers.synthesizer,
            config.voice,
            audio_tx,
            event_tx,
        ));
        let playback = Arc::new(Mutex::new(PlaybackBuffer::new(sink)));

        let mut routers = Vec::new();

        // Caller utterances drive completions. The interaction counter
        // lives here: one increment per finalized utterance.
        let completion_input = completion.clone();
        routers.push(tokio::spawn(async move {
            let mut interaction_id: u64 = 0;
            while let Some(text) = utterance_rx.recv().await {
                if text.trim().is_empty() {
                    continue;
                }
                if completion_input.should_reset_context().await {
                    completion_input.reset_context().await;
                }
                let id = interaction_id;
                interaction_id += 1;
                completion_input.submit(text, id).await;
            }
        }));

        // Completed segments fan out to synthesis.
        let synthesis_input = synthesis.clone();
        routers.push(tokio::spawn(async move {
            while let Some(partial) = partial_rx.recv().await {
                synthesis_input.synthesize(partial).await;
            }
        }));

        // Synthesized units are reordered and delivered.
        let playback_input = playback.clone();
        routers.push(tokio::spawn(async move {
            while let Some(unit) = audio_rx.recv().await {
                if let Err(err) = playback_input.lock().await.accept(unit).await {
                    // The socket loop observes the same failure and closes
                    // the session; here we only record it.
                    error!(error = %err, "transport rejected audio unit");
                }
            }
        }));

        // Stage-level error events.
        routers.push(tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    SessionEvent::CompletionFailed {
                        interaction_id,
                        error,
                    } => {
                        error!(interaction_id, error = %error, "completion stage gave up");
                    }
                    SessionEvent::SynthesisFailed { index, error } => {
                        warn!(index, error = %error, "segment synthesis failed");
                    }
                }
            }
        }));

        Self {
            state: SessionState::Idle,
            ids: None,
            speech_to_text: providers.speech_to_text,
            completion,
            synthesis,
            playback,
            transcription: None,
            utterance_tx,
            routers,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identifiers assigned by the transport, once known.
    pub fn ids(&self) -> Option<&CallIds> {
        self.ids.as_ref()
    }

    /// Routes one inbound transport event. Events after close are ignored.
    pub async fn handle_event(&mut self, event: TransportEvent) {
        if self.state == SessionState::Closed {
            debug!("transport event after close ignored");
            return;
        }
        match event {
            TransportEvent::Connected => {}
            TransportEvent::Start { start } => self.handle_start(start).await,
            TransportEvent::Media { media } => {
                if matches!(self.state, SessionState::Started | SessionState::Streaming) {
                    self.state = SessionState::Streaming;
                    if let Some(transcription) = &self.transcription {
                        transcription.send(media.payload);
                    }
                } else {
                    debug!("media frame before start dropped");
                }
            }
            TransportEvent::Mark { mark } => {
                self.playback.lock().await.ack_mark(&mark.name);
            }
            TransportEvent::Stop => {
                info!("transport signaled stop");
                self.close().await;
            }
        }
    }

    async fn handle_start(&mut self, start: StartMeta) {
        if self.state != SessionState::Idle {
            warn!("duplicate start event ignored");
            return;
        }
        info!(
            stream_sid = %start.stream_sid,
            call_sid = %start.call_sid,
            "call started"
        );

        self.completion.set_call_sid(start.call_sid.clone()).await;
        self.playback
            .lock()
            .await
            .set_stream_sid(start.stream_sid.clone());

        match TranscriptionStage::start(self.speech_to_text.clone(), self.utterance_tx.clone())
            .await
        {
            Ok(stage) => self.transcription = Some(stage),
            // The session stays up: the transport leg is healthy and the
            // stop event still needs handling. No utterances will arrive.
            Err(err) => error!(error = %err, "failed to open transcription stream"),
        }

        self.ids = Some(CallIds {
            stream_sid: start.stream_sid,
            call_sid: start.call_sid,
        });
        self.state = SessionState::Started;
    }

    /// Tears the session down: stops routing, aborts in-flight provider
    /// calls, resets stage state, clears the playback buffer. Idempotent
    /// and safe from any state, including before `start` ever arrived.
    /// Cleanup failures are logged, never raised.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        for task in self.routers.drain(..) {
            task.abort();
        }
        if let Some(transcription) = self.transcription.take() {
            transcription.shutdown();
        }
        self.synthesis.shutdown().await;
        self.completion.shutdown().await;

        let mut playback = self.playback.lock().await;
        playback.clear();
        drop(playback);

        info!("session closed");
    }

    /// Pending playback marks, exposed for teardown verification.
    pub async fn pending_marks(&self) -> usize {
        self.playback.lock().await.pending_marks().len()
    }
}
