//! Media-stream WebSocket handler: one connection, one call session.

use crate::AppState;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vocalink_pipeline::{SessionConfig, SessionController, TransportError, TransportSink};
use vocalink_types::{MarkName, MediaPayload, OutboundFrame, TransportEvent};

/// Outbound frames buffered per connection. Beyond this the telephony leg
/// is too slow and the send blocks until it drains.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Outbound half of the transport leg: every audio unit goes out as a
/// `media` frame immediately followed by the `mark` frame naming its
/// acknowledgement label.
pub struct WsTransportSink {
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl TransportSink for WsTransportSink {
    async fn send_audio(
        &self,
        stream_sid: &str,
        payload: &[u8],
        label: &str,
    ) -> Result<(), TransportError> {
        let frames = [
            OutboundFrame::Media {
                stream_sid: stream_sid.to_string(),
                media: MediaPayload {
                    payload: base64::engine::general_purpose::STANDARD.encode(payload),
                },
            },
            OutboundFrame::Mark {
                stream_sid: stream_sid.to_string(),
                mark: MarkName {
                    name: label.to_string(),
                },
            },
        ];
        for frame in frames {
            let json = serde_json::to_string(&frame)
                .map_err(|e| TransportError(format!("encode outbound frame: {e}")))?;
            self.tx
                .send(json)
                .await
                .map_err(|_| TransportError("transport connection closed".to_string()))?;
        }
        Ok(())
    }
}

/// WebSocket handler: `GET /connection`.
///
/// Enforces the process-wide session capacity before upgrading; an
/// over-capacity connection is refused with 503 so the telephony provider
/// can fail over rather than queue behind a saturated process.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let admitted = state
        .active_sessions
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
            (active < state.max_sessions).then_some(active + 1)
        });

    match admitted {
        Ok(active) => {
            debug!(active = active + 1, "accepting call connection");
            ws.on_upgrade(move |socket| handle_socket(socket, state))
        }
        Err(active) => {
            warn!(
                active,
                max = state.max_sessions,
                "refusing call connection, session capacity reached"
            );
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Resolves the per-call session configuration: configured defaults,
/// enriched by the records lookup when one is configured. Lookup failures
/// fall back to the defaults — a missing record never blocks a call.
async fn session_config_for_call(state: &AppState) -> SessionConfig {
    let mut config = state.session_template.clone();
    let Some(records) = &state.records else {
        return config;
    };

    if let Some(contact_id) = state.contact_id {
        match records.caller_context(contact_id).await {
            Ok(context) if !context.is_empty() => {
                config.system_instruction = format!(
                    "{} Here is information about the caller you are speaking with: {}",
                    config.system_instruction, context
                );
            }
            Ok(_) => {}
            Err(err) => {
                warn!(contact_id, error = %err, "caller context lookup failed, using defaults");
            }
        }
    }

    match records.selected_voice().await {
        Ok(voice) => config.voice = voice,
        Err(err) => {
            warn!(error = %err, "selected voice lookup failed, using default voice");
        }
    }

    config
}

/// Handles one media-stream connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded outbound queue so a slow telephony leg cannot grow memory
    // without limit; a forwarding task owns the socket sender.
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let session_config = session_config_for_call(&state).await;
    let sink = Arc::new(WsTransportSink { tx });
    let mut controller = SessionController::new(state.providers.clone(), sink, session_config);

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "websocket read failed, closing session");
                break;
            }
        };
        match message {
            AxumMessage::Text(text) => match serde_json::from_str::<TransportEvent>(text.as_str())
            {
                Ok(event) => {
                    let stopping = matches!(event, TransportEvent::Stop);
                    controller.handle_event(event).await;
                    if stopping {
                        break;
                    }
                }
                Err(err) => {
                    // A garbled frame is a stage-local fault, not a
                    // transport fault; skip it and keep the call alive.
                    warn!(error = %err, "skipping unparseable transport frame");
                }
            },
            AxumMessage::Close(_) => {
                debug!("websocket closed by transport");
                break;
            }
            _ => {}
        }
    }

    controller.close().await;
    send_task.abort();
    let remaining = state.active_sessions.fetch_sub(1, Ordering::SeqCst) - 1;
    info!(active = remaining, "call connection finished");
}
