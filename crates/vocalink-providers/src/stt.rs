//! Streaming speech-to-text client over WebSocket.
//!
//! Speaks a Deepgram-style live transcription protocol: raw audio goes up
//! as binary frames, JSON results come back with `is_final` /
//! `speech_final` flags. Finalized fragments are accumulated until the
//! provider signals the end of the utterance, then emitted as one
//! utterance. Provider errors end the pump with a warning — the session
//! keeps running and simply hears nothing more, per the stage's
//! swallow-and-log failure policy.

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::fmt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};
use vocalink_pipeline::{ProviderError, SpeechToText, SttStream};

/// Inbound audio frames buffered toward the provider socket.
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Client for a live transcription WebSocket endpoint.
#[derive(Clone)]
pub struct StreamingSttClient {
    endpoint: String,
    api_key: String,
}

impl StreamingSttClient {
    /// `endpoint` is the full WebSocket URL including model/encoding query
    /// parameters (the provider-specific part of the contract).
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for StreamingSttClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSttClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct TranscriptResult {
    #[serde(default)]
    channel: Option<TranscriptChannel>,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
}

#[derive(Deserialize)]
struct TranscriptChannel {
    #[serde(default)]
    alternatives: Vec<TranscriptAlternative>,
}

#[derive(Deserialize)]
struct TranscriptAlternative {
    #[serde(default)]
    transcript: String,
}

/// Folds one provider result message into the running utterance.
/// Returns the finalized utterance when the provider marks the end of
/// speech.
fn fold_result(raw: &str, accumulated: &mut String) -> Option<String> {
    let result: TranscriptResult = match serde_json::from_str(raw) {
        Ok(result) => result,
        Err(err) => {
            debug!(error = %err, "ignoring unparseable transcription message");
            return None;
        }
    };
    let transcript = result
        .channel
        .as_ref()
        .and_then(|c| c.alternatives.first())
        .map(|a| a.transcript.as_str())
        .unwrap_or_default();

    if result.is_final && !transcript.is_empty() {
        if !accumulated.is_empty() {
            accumulated.push(' ');
        }
        accumulated.push_str(transcript);
    }

    if result.speech_final {
        let utterance = std::mem::take(accumulated);
        let utterance = utterance.trim().to_string();
        if utterance.is_empty() {
            None
        } else {
            Some(utterance)
        }
    } else {
        None
    }
}

#[async_trait::async_trait]
impl SpeechToText for StreamingSttClient {
    async fn open_stream(
        &self,
        utterances: mpsc::Sender<String>,
    ) -> Result<SttStream, ProviderError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| ProviderError::Rejected(format!("invalid endpoint: {e}")))?;
        let auth = format!("Token {}", self.api_key)
            .parse()
            .map_err(|_| ProviderError::Rejected("api key is not header-safe".to_string()))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (frames_tx, mut frames_rx) = mpsc::channel::<String>(FRAME_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut accumulated = String::new();
            loop {
                tokio::select! {
                    frame = frames_rx.recv() => match frame {
                        Some(payload) => {
                            let audio = match base64::engine::general_purpose::STANDARD
                                .decode(payload.as_bytes())
                            {
                                Ok(audio) => audio,
                                Err(err) => {
                                    warn!(error = %err, "dropping undecodable audio frame");
                                    continue;
                                }
                            };
                            if let Err(err) = ws_tx.send(Message::Binary(audio.into())).await {
                                warn!(error = %err, "transcription socket write failed");
                                break;
                            }
                        }
                        None => {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    message = ws_rx.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(utterance) = fold_result(text.as_str(), &mut accumulated) {
                                if utterances.send(utterance).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("transcription socket closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(error = %err, "transcription socket read failed");
                            break;
                        }
                    },
                }
            }
        });

        Ok(SttStream {
            frames: frames_tx,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(transcript: &str, is_final: bool, speech_final: bool) -> String {
        format!(
            "{{\"channel\":{{\"alternatives\":[{{\"transcript\":\"{transcript}\"}}]}},\
             \"is_final\":{is_final},\"speech_final\":{speech_final}}}"
        )
    }

    #[test]
    fn interim_results_do_not_emit() {
        let mut acc = String::new();
        assert!(fold_result(&result("hel", false, false), &mut acc).is_none());
        assert!(acc.is_empty());
    }

    #[test]
    fn finals_accumulate_until_speech_final() {
        let mut acc = String::new();
        assert!(fold_result(&result("I have", true, false), &mut acc).is_none());
        assert!(fold_result(&result("a headache", true, false), &mut acc).is_none());
        let utterance = fold_result(&result("today", true, true), &mut acc);
        assert_eq!(utterance.as_deref(), Some("I have a headache today"));
        assert!(acc.is_empty(), "accumulator clears after emission");
    }

    #[test]
    fn speech_final_with_empty_accumulation_emits_nothing() {
        let mut acc = String::new();
        assert!(fold_result(&result("", true, true), &mut acc).is_none());
    }

    #[test]
    fn unparseable_message_is_ignored() {
        let mut acc = String::new();
        assert!(fold_result("{broken", &mut acc).is_none());
        assert!(fold_result("{\"type\":\"Metadata\"}", &mut acc).is_none());
    }
}
