//! Vocalink server library: application state and router assembly.

pub mod api_ws;
pub mod config;

use axum::{routing::get, Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use vocalink_pipeline::{SessionConfig, SessionProviders};
use vocalink_providers::RecordsClient;

/// Shared state for all connections.
pub struct AppState {
    /// Provider boundaries handed to every session.
    pub providers: SessionProviders,
    /// Read-only record store, if configured.
    pub records: Option<RecordsClient>,
    /// Contact whose context string is read at session start.
    pub contact_id: Option<i64>,
    /// Per-call session defaults from configuration.
    pub session_template: SessionConfig,
    /// Maximum concurrent call sessions.
    pub max_sessions: usize,
    /// Currently open call sessions.
    pub active_sessions: AtomicUsize,
}

impl AppState {
    pub fn new(
        providers: SessionProviders,
        records: Option<RecordsClient>,
        contact_id: Option<i64>,
        session_template: SessionConfig,
        max_sessions: usize,
    ) -> Self {
        Self {
            providers,
            records,
            contact_id,
            session_template,
            max_sessions,
            active_sessions: AtomicUsize::new(0),
        }
    }
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by load balancers,
/// monitoring, and CI to verify the server is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the application router with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/connection", get(api_ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}
