//! End-to-end WebSocket tests: a simulated telephony leg drives a real
//! listener with mock providers behind the pipeline.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use futures_util::{stream, SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tower::ServiceExt;
use vocalink_pipeline::{
    CompletionDelta, CompletionProvider, CompletionStream, ProviderError, SessionConfig,
    SessionProviders, SpeechSynthesizer, SpeechToText, SttStream,
};
use vocalink_providers::RecordsClient;
use vocalink_server::{app, AppState};
use vocalink_types::{Turn, VoiceSelector};

struct MockStt;

#[async_trait]
impl SpeechToText for MockStt {
    async fn open_stream(
        &self,
        utterances: mpsc::Sender<String>,
    ) -> Result<SttStream, ProviderError> {
        let (frames_tx, mut frames_rx) = mpsc::channel::<String>(32);
        let task = tokio::spawn(async move {
            while let Some(_frame) = frames_rx.recv().await {
                if utterances
                    .send("my head hurts".to_string())
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        Ok(SttStream {
            frames: frames_tx,
            task,
        })
    }
}

struct MockChat {
    chunks: Vec<&'static str>,
}

#[async_trait]
impl CompletionProvider for MockChat {
    async fn stream_completion(&self, _turns: &[Turn]) -> Result<CompletionStream, ProviderError> {
        let mut deltas: Vec<Result<CompletionDelta, ProviderError>> = self
            .chunks
            .iter()
            .map(|c| Ok(CompletionDelta::text(*c)))
            .collect();
        deltas.push(Ok(CompletionDelta::finish()));
        Ok(stream::iter(deltas).boxed())
    }
}

struct MockTts;

#[async_trait]
impl SpeechSynthesizer for MockTts {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSelector,
    ) -> Result<Vec<u8>, ProviderError> {
        Ok(text.as_bytes().to_vec())
    }
}

fn mock_state(max_sessions: usize, records: Option<RecordsClient>) -> Arc<AppState> {
    let providers = SessionProviders {
        speech_to_text: Arc::new(MockStt),
        completion: Arc::new(MockChat {
            chunks: vec!["Rest well• ", "Hydrate• "],
        }),
        synthesizer: Arc::new(MockTts),
    };
    Arc::new(AppState::new(
        providers,
        records,
        Some(1),
        SessionConfig::default(),
        max_sessions,
    ))
}

async fn serve(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.expect("serve");
    });
    addr
}

fn start_frame() -> WsMessage {
    WsMessage::text(
        r#"{"event":"start","start":{"streamSid":"MZ-e2e","callSid":"CA-e2e"}}"#.to_string(),
    )
}

fn media_frame() -> WsMessage {
    WsMessage::text(r#"{"event":"media","media":{"payload":"AAAA"}}"#.to_string())
}

/// Reads outbound frames until `count` media/mark pairs have arrived or the
/// deadline passes.
async fn read_frames<S>(socket: &mut S, count: usize) -> Vec<Value>
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut frames = Vec::new();
    while frames.len() < count {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for outbound frame")
            .expect("socket ended early")
            .expect("socket error");
        if let WsMessage::Text(text) = message {
            frames.push(serde_json::from_str::<Value>(text.as_str()).expect("frame json"));
        }
    }
    frames
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = app(mock_state(4, None));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn call_round_trip_delivers_ordered_media_and_marks() {
    let addr = serve(mock_state(4, None)).await;
    let (mut socket, _) = connect_async(format!("ws://{addr}/connection"))
        .await
        .expect("connect");

    socket.send(start_frame()).await.expect("send start");
    socket.send(media_frame()).await.expect("send media");

    // Two segments → two media/mark pairs, strictly ordered.
    let frames = read_frames(&mut socket, 4).await;

    assert_eq!(frames[0]["event"], "media");
    assert_eq!(frames[0]["streamSid"], "MZ-e2e");
    let audio = base64::engine::general_purpose::STANDARD
        .decode(frames[0]["media"]["payload"].as_str().expect("payload"))
        .expect("base64 payload");
    assert_eq!(audio, b"Rest well\xE2\x80\xA2".to_vec());

    assert_eq!(frames[1]["event"], "mark");
    assert_eq!(frames[1]["mark"]["name"], "0:Rest well•");

    assert_eq!(frames[2]["event"], "media");
    let audio = base64::engine::general_purpose::STANDARD
        .decode(frames[2]["media"]["payload"].as_str().expect("payload"))
        .expect("base64 payload");
    assert_eq!(audio, b"Hydrate\xE2\x80\xA2".to_vec());

    assert_eq!(frames[3]["event"], "mark");
    assert_eq!(frames[3]["mark"]["name"], "1:Hydrate•");

    // Acknowledge a mark and end the call; the server must not error.
    socket
        .send(WsMessage::text(
            r#"{"event":"mark","mark":{"name":"0:Rest well•"}}"#.to_string(),
        ))
        .await
        .expect("send mark ack");
    socket
        .send(WsMessage::text(r#"{"event":"stop"}"#.to_string()))
        .await
        .expect("send stop");
}

#[tokio::test]
async fn garbled_frames_are_skipped_not_fatal() {
    let addr = serve(mock_state(4, None)).await;
    let (mut socket, _) = connect_async(format!("ws://{addr}/connection"))
        .await
        .expect("connect");

    socket
        .send(WsMessage::text("{not json at all".to_string()))
        .await
        .expect("send garbage");
    socket
        .send(WsMessage::text(r#"{"event":"dtmf"}"#.to_string()))
        .await
        .expect("send unknown event");
    socket.send(start_frame()).await.expect("send start");
    socket.send(media_frame()).await.expect("send media");

    // The session is still alive and answers.
    let frames = read_frames(&mut socket, 2).await;
    assert_eq!(frames[0]["event"], "media");
    assert_eq!(frames[1]["event"], "mark");
}

#[tokio::test]
async fn capacity_limit_refuses_excess_connections() {
    let addr = serve(mock_state(1, None)).await;

    let (_held, _) = connect_async(format!("ws://{addr}/connection"))
        .await
        .expect("first connection");

    let refused = connect_async(format!("ws://{addr}/connection")).await;
    match refused {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 503);
        }
        other => panic!("expected 503 refusal, got {other:?}"),
    }
}

#[tokio::test]
async fn capacity_is_released_when_a_call_ends() {
    let addr = serve(mock_state(1, None)).await;

    {
        let (mut socket, _) = connect_async(format!("ws://{addr}/connection"))
            .await
            .expect("first connection");
        socket
            .send(WsMessage::text(r#"{"event":"stop"}"#.to_string()))
            .await
            .expect("send stop");
        // Wait for the server to finish the session and drop the slot.
        let _ = tokio::time::timeout(Duration::from_secs(2), socket.next()).await;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        match connect_async(format!("ws://{addr}/connection")).await {
            Ok(_) => break,
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(err) => panic!("slot never released: {err}"),
        }
    }
}

#[tokio::test]
async fn unreachable_record_store_falls_back_to_defaults() {
    // A records client pointing nowhere: lookups fail, the call proceeds.
    let records = RecordsClient::new(reqwest::Client::new(), "http://127.0.0.1:1");
    let addr = serve(mock_state(4, Some(records))).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/connection"))
        .await
        .expect("connect");
    socket.send(start_frame()).await.expect("send start");
    socket.send(media_frame()).await.expect("send media");

    let frames = read_frames(&mut socket, 2).await;
    assert_eq!(frames[0]["event"], "media");
}
