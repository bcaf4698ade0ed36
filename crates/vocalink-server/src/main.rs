//! Vocalink server binary — hosts the per-call conversational pipeline.
//!
//! Starts an axum server with structured logging, builds the provider
//! clients from configuration, and serves the media-stream WebSocket with
//! graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use vocalink_pipeline::SessionProviders;
use vocalink_providers::{ChatClient, RecordsClient, StreamingSttClient, TtsClient};
use vocalink_server::{app, config, AppState};

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("VOCALINK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // One HTTP client shared by every provider boundary.
    let http = reqwest::Client::new();

    let providers = SessionProviders {
        speech_to_text: Arc::new(StreamingSttClient::new(
            config.providers.stt.endpoint.clone(),
            config.providers.stt.api_key.clone(),
        )),
        completion: Arc::new(ChatClient::new(
            http.clone(),
            config.providers.chat.base_url.clone(),
            config.providers.chat.api_key.clone(),
            config.providers.chat.model.clone(),
        )),
        synthesizer: Arc::new(TtsClient::new(
            http.clone(),
            config.providers.tts.base_url.clone(),
            config.providers.tts.api_key.clone(),
        )),
    };

    let records = if config.providers.records.base_url.is_empty() {
        None
    } else {
        Some(RecordsClient::new(
            http,
            config.providers.records.base_url.clone(),
        ))
    };

    let state = Arc::new(AppState::new(
        providers,
        records,
        config.providers.records.contact_id,
        config.session_template(),
        config.server.max_sessions,
    ));

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, max_sessions = config.server.max_sessions, "starting vocalink server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("vocalink server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
