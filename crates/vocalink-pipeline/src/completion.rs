//! Completion stage: the text round trip with the generative model.
//!
//! Holds the conversation history, streams one completion at a time, and
//! cuts the streamed reply into ordered partial responses for synthesis.
//! At most one completion is in flight per session — the single-permit
//! semaphore replaces a mutable "processing" flag and is released on every
//! exit path, including cancellation.

use crate::context::{ConversationContext, RESET_THRESHOLD};
use crate::error::ProviderError;
use crate::event::SessionEvent;
use crate::provider::CompletionProvider;
use crate::segment::SegmenterKind;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vocalink_types::{PartialResponse, Role};

/// Spoken to the caller when the completion round trip gives up, so a
/// provider outage never turns into dead air.
pub const FALLBACK_RESPONSE: &str =
    "I apologize, but I'm having trouble processing your request. Could you please repeat that?";

/// Tuning for the completion stage.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Attempts against the text provider before giving up.
    pub max_attempts: u32,
    /// Context length beyond which `should_reset_context` reports true.
    pub reset_threshold: usize,
    /// Strategy for cutting streamed replies into playback units.
    pub segmenter: SegmenterKind,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            reset_threshold: RESET_THRESHOLD,
            segmenter: SegmenterKind::default(),
        }
    }
}

/// Per-session completion stage handle. Cheap to clone; clones share the
/// same history, sequence index, and in-flight guard.
#[derive(Clone)]
pub struct CompletionStage {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn CompletionProvider>,
    context: Mutex<ConversationContext>,
    next_index: AtomicU64,
    in_flight: Arc<Semaphore>,
    partial_tx: mpsc::Sender<PartialResponse>,
    event_tx: mpsc::Sender<SessionEvent>,
    call_sid: Mutex<Option<String>>,
    task: Mutex<Option<JoinHandle<()>>>,
    config: CompletionConfig,
}

impl CompletionStage {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        partial_tx: mpsc::Sender<PartialResponse>,
        event_tx: mpsc::Sender<SessionEvent>,
        system_instruction: impl Into<String>,
        greeting: impl Into<String>,
        config: CompletionConfig,
    ) -> Self {
        let context = ConversationContext::new(system_instruction, greeting)
            .with_reset_threshold(config.reset_threshold);
        Self {
            inner: Arc::new(Inner {
                provider,
                context: Mutex::new(context),
                next_index: AtomicU64::new(0),
                in_flight: Arc::new(Semaphore::new(1)),
                partial_tx,
                event_tx,
                call_sid: Mutex::new(None),
                task: Mutex::new(None),
                config,
            }),
        }
    }

    /// Binds the opaque call reference once the transport assigns one.
    pub async fn set_call_sid(&self, call_sid: impl Into<String>) {
        *self.inner.call_sid.lock().await = Some(call_sid.into());
    }

    /// Appends a caller turn and starts a streamed completion.
    ///
    /// Guarded: if a completion is already in flight for this session the
    /// call is a no-op — nothing is appended and no provider request is
    /// issued.
    pub async fn submit(&self, text: String, interaction_id: u64) {
        self.submit_as(Role::User, text, interaction_id).await;
    }

    /// [`submit`](Self::submit) with an explicit role.
    pub async fn submit_as(&self, role: Role, text: String, interaction_id: u64) {
        let permit = match self.inner.in_flight.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(interaction_id, "completion already in flight, dropping submission");
                return;
            }
        };

        self.inner.context.lock().await.push(role, text);

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            inner.run_completion(interaction_id).await;
            // Releases the in-flight guard on success, exhaustion, and
            // cancellation alike.
            drop(permit);
        });
        *self.inner.task.lock().await = Some(handle);
    }

    /// Truncates the history to the system instruction and greeting and
    /// restarts the output sequence at index zero.
    pub async fn reset_context(&self) {
        self.inner.context.lock().await.reset();
        self.inner.next_index.store(0, Ordering::SeqCst);
        info!("conversation context reset");
    }

    /// True when the history has grown past the configured threshold.
    pub async fn should_reset_context(&self) -> bool {
        self.inner.context.lock().await.should_reset()
    }

    pub async fn context_len(&self) -> usize {
        self.inner.context.lock().await.len()
    }

    /// Aborts any in-flight completion and resets the history. Late results
    /// from the aborted task are discarded, never emitted.
    pub async fn shutdown(&self) {
        if let Some(task) = self.inner.task.lock().await.take() {
            task.abort();
        }
        self.reset_context().await;
    }
}

impl Inner {
    async fn run_completion(&self, interaction_id: u64) {
        let mut attempt: u32 = 1;
        loop {
            match self.stream_once(interaction_id).await {
                Ok(reply) => {
                    let mut context = self.context.lock().await;
                    context.push(Role::Assistant, reply);
                    debug!(
                        interaction_id,
                        context_len = context.len(),
                        "appended assistant turn"
                    );
                    return;
                }
                Err(err) if attempt < self.config.max_attempts && err.is_retryable() => {
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    warn!(
                        interaction_id,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        error = %err,
                        "completion attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        interaction_id,
                        attempt,
                        error = %err,
                        "completion failed, answering with fallback"
                    );
                    self.emit_partial(FALLBACK_RESPONSE.to_string(), interaction_id)
                        .await;
                    let _ = self
                        .event_tx
                        .send(SessionEvent::CompletionFailed {
                            interaction_id,
                            error: err,
                        })
                        .await;
                    return;
                }
            }
        }
    }

    /// One streamed attempt. Returns the complete accumulated reply for the
    /// history; segments are emitted as they complete.
    async fn stream_once(&self, interaction_id: u64) -> Result<String, ProviderError> {
        let turns = self.context.lock().await.turns().to_vec();
        let mut stream = self.provider.stream_completion(&turns).await?;

        let mut segmenter = self.config.segmenter.build();
        let mut complete = String::new();

        while let Some(delta) = stream.next().await {
            let delta = delta?;
            complete.push_str(&delta.content);
            for segment in segmenter.push(&delta.content) {
                self.emit_partial(segment, interaction_id).await;
            }
            if delta.finished {
                break;
            }
        }

        if let Some(rest) = segmenter.finish() {
            self.emit_partial(rest, interaction_id).await;
        }

        Ok(complete)
    }

    async fn emit_partial(&self, text: String, interaction_id: u64) {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let call_sid = self.call_sid.lock().await.clone();
        let partial = PartialResponse {
            index,
            text,
            interaction_id,
            call_sid,
        };
        if self.partial_tx.send(partial).await.is_err() {
            debug!(index, "partial response dropped, session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CompletionDelta, CompletionStream};
    use async_trait::async_trait;
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use vocalink_types::Turn;

    /// One scripted provider outcome per attempt.
    enum Attempt {
        Fail(ProviderError),
        Reply(Vec<&'static str>),
    }

    struct ScriptedProvider {
        attempts: StdMutex<VecDeque<Attempt>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(attempts: Vec<Attempt>) -> Arc<Self> {
            Arc::new(Self {
                attempts: StdMutex::new(attempts.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn stream_completion(
            &self,
            _turns: &[Turn],
        ) -> Result<CompletionStream, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let attempt = self
                .attempts
                .lock()
                .expect("scripted attempts lock")
                .pop_front();
            match attempt {
                Some(Attempt::Fail(err)) => Err(err),
                Some(Attempt::Reply(chunks)) => {
                    let mut deltas: Vec<Result<CompletionDelta, ProviderError>> = chunks
                        .into_iter()
                        .map(|c| Ok(CompletionDelta::text(c)))
                        .collect();
                    deltas.push(Ok(CompletionDelta::finish()));
                    Ok(stream::iter(deltas).boxed())
                }
                None => panic!("provider called more times than scripted"),
            }
        }
    }

    struct Harness {
        stage: CompletionStage,
        partial_rx: mpsc::Receiver<PartialResponse>,
        event_rx: mpsc::Receiver<SessionEvent>,
    }

    fn harness(provider: Arc<ScriptedProvider>) -> Harness {
        let (partial_tx, partial_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(32);
        let stage = CompletionStage::new(
            provider,
            partial_tx,
            event_tx,
            "be brief",
            "hello",
            CompletionConfig::default(),
        );
        Harness {
            stage,
            partial_rx,
            event_rx,
        }
    }

    /// Waits for the spawned completion task to settle.
    async fn settle(stage: &CompletionStage) {
        let task = stage.inner.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    #[tokio::test]
    async fn streamed_reply_is_segmented_into_ordered_partials() {
        let provider = ScriptedProvider::new(vec![Attempt::Reply(vec![
            "Take two ",
            "tablets daily• ",
            "Drink plenty ",
            "of water• ",
        ])]);
        let mut h = harness(provider);

        h.stage.submit("what do I do?".to_string(), 0).await;
        settle(&h.stage).await;

        let first = h.partial_rx.recv().await.expect("first partial");
        let second = h.partial_rx.recv().await.expect("second partial");
        assert_eq!(first.index, 0);
        assert_eq!(first.text, "Take two tablets daily•");
        assert_eq!(second.index, 1);
        assert_eq!(second.text, "Drink plenty of water•");
        assert!(h.partial_rx.try_recv().is_err());

        // History gained the caller turn and one complete assistant turn.
        assert_eq!(h.stage.context_len().await, 4);
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_a_noop() {
        // A provider that never finishes streaming: channel-backed stream
        // held open for the duration of the test.
        struct StallingProvider {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl CompletionProvider for StallingProvider {
            async fn stream_completion(
                &self,
                _turns: &[Turn],
            ) -> Result<CompletionStream, ProviderError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(stream::pending().boxed())
            }
        }

        let provider = Arc::new(StallingProvider {
            calls: AtomicUsize::new(0),
        });
        let (partial_tx, _partial_rx) = mpsc::channel(8);
        let (event_tx, _event_rx) = mpsc::channel(8);
        let stage = CompletionStage::new(
            provider.clone(),
            partial_tx,
            event_tx,
            "be brief",
            "hello",
            CompletionConfig::default(),
        );

        stage.submit("first".to_string(), 0).await;
        // Let the spawned task reach the provider call.
        tokio::task::yield_now().await;
        let len_before = stage.context_len().await;

        stage.submit("second".to_string(), 1).await;
        tokio::task::yield_now().await;

        assert_eq!(stage.context_len().await, len_before);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        stage.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_exponential_backoff_then_succeeds() {
        let provider = ScriptedProvider::new(vec![
            Attempt::Fail(ProviderError::Network("reset".into())),
            Attempt::Fail(ProviderError::Status {
                code: 429,
                message: "rate limited".into(),
            }),
            Attempt::Reply(vec!["all better now•"]),
        ]);
        let mut h = harness(provider.clone());

        let started = tokio::time::Instant::now();
        h.stage.submit("hello?".to_string(), 0).await;
        settle(&h.stage).await;

        // Backoff after attempt one is 2s, after attempt two 4s.
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert_eq!(provider.calls(), 3);

        let partial = h.partial_rx.recv().await.expect("partial");
        assert_eq!(partial.text, "all better now•");
        // Exactly one assistant turn was appended.
        assert_eq!(h.stage.context_len().await, 4);
        assert!(h.event_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_emit_one_fallback_and_an_error_event() {
        let provider = ScriptedProvider::new(vec![
            Attempt::Fail(ProviderError::Network("a".into())),
            Attempt::Fail(ProviderError::Network("b".into())),
            Attempt::Fail(ProviderError::Network("c".into())),
        ]);
        let mut h = harness(provider.clone());

        h.stage.submit("hello?".to_string(), 7).await;
        settle(&h.stage).await;

        assert_eq!(provider.calls(), 3);

        let partial = h.partial_rx.recv().await.expect("fallback partial");
        assert_eq!(partial.text, FALLBACK_RESPONSE);
        assert_eq!(partial.interaction_id, 7);
        assert!(h.partial_rx.try_recv().is_err(), "exactly one fallback");

        match h.event_rx.recv().await.expect("error event") {
            SessionEvent::CompletionFailed { interaction_id, .. } => {
                assert_eq!(interaction_id, 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // No assistant turn was appended: system, greeting, caller turn.
        assert_eq!(h.stage.context_len().await, 3);
    }

    #[tokio::test]
    async fn permanent_fault_fails_fast_without_retrying() {
        let provider = ScriptedProvider::new(vec![Attempt::Fail(ProviderError::from_status(
            401,
            "bad key",
        ))]);
        let mut h = harness(provider.clone());

        h.stage.submit("hello?".to_string(), 0).await;
        settle(&h.stage).await;

        assert_eq!(provider.calls(), 1, "rejected request must not retry");
        let partial = h.partial_rx.recv().await.expect("fallback partial");
        assert_eq!(partial.text, FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn reset_context_restarts_sequence_at_zero() {
        let provider = ScriptedProvider::new(vec![
            Attempt::Reply(vec!["first reply•"]),
            Attempt::Reply(vec!["fresh start•"]),
        ]);
        let mut h = harness(provider);

        h.stage.submit("one".to_string(), 0).await;
        settle(&h.stage).await;
        assert_eq!(h.partial_rx.recv().await.expect("partial").index, 0);

        h.stage.reset_context().await;
        assert_eq!(h.stage.context_len().await, 2);

        h.stage.submit("two".to_string(), 1).await;
        settle(&h.stage).await;
        let partial = h.partial_rx.recv().await.expect("partial after reset");
        assert_eq!(partial.index, 0, "sequence restarts after reset");
    }

    #[tokio::test]
    async fn guard_is_released_after_completion() {
        let provider = ScriptedProvider::new(vec![
            Attempt::Reply(vec!["one•"]),
            Attempt::Reply(vec!["two•"]),
        ]);
        let mut h = harness(provider.clone());

        h.stage.submit("first".to_string(), 0).await;
        settle(&h.stage).await;
        h.stage.submit("second".to_string(), 1).await;
        settle(&h.stage).await;

        assert_eq!(provider.calls(), 2);
        let _ = h.partial_rx.recv().await;
        let _ = h.partial_rx.recv().await;
    }
}
