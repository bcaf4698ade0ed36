//! OpenAI-compatible streaming chat completion client.
//!
//! Sends the full conversation as role-tagged messages with `stream: true`
//! and parses the server-sent-event `data:` lines off the byte stream. The
//! stream is bridged through a bounded channel so the pipeline consumes a
//! plain [`CompletionStream`] without knowing about SSE framing.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use vocalink_pipeline::{CompletionDelta, CompletionProvider, CompletionStream, ProviderError};
use vocalink_types::Turn;

/// Buffered deltas between the SSE pump and the consumer.
const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl CompletionProvider for ChatClient {
    async fn stream_completion(&self, turns: &[Turn]) -> Result<CompletionStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: turns,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        tokio::spawn(pump_sse(response, tx));
        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Reads the response body and forwards parsed deltas until the finish
/// signal, a body error, or the consumer going away.
async fn pump_sse(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<CompletionDelta, ProviderError>>,
) {
    let mut body = response.bytes_stream();
    let mut parser = SseParser::default();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tx
                    .send(Err(ProviderError::Network(err.to_string())))
                    .await;
                return;
            }
        };
        for item in parser.push(&chunk) {
            let finished = matches!(&item, Ok(delta) if delta.finished);
            if tx.send(item).await.is_err() {
                debug!("completion consumer went away mid-stream");
                return;
            }
            if finished {
                return;
            }
        }
    }

    // Body ended without an explicit finish marker; close the reply anyway.
    let _ = tx.send(Ok(CompletionDelta::finish())).await;
}

/// Incremental server-sent-event parser for the completion stream.
///
/// Buffers raw bytes so a UTF-8 character split across network chunks is
/// reassembled before any line is decoded.
#[derive(Default)]
struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<CompletionDelta, ProviderError>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                out.push(Ok(CompletionDelta::finish()));
                continue;
            }
            match serde_json::from_str::<StreamChunk>(data) {
                Ok(parsed) => {
                    if let Some(choice) = parsed.choices.into_iter().next() {
                        out.push(Ok(CompletionDelta {
                            content: choice.delta.content.unwrap_or_default(),
                            finished: choice.finish_reason.is_some(),
                        }));
                    }
                }
                Err(err) => {
                    out.push(Err(ProviderError::Protocol(format!(
                        "bad stream chunk: {err}"
                    ))));
                }
            }
        }
        out
    }
}
