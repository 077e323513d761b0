//! HTTP server exposing the chat relay
//!
//! Routes:
//! - `POST /api/chat` streams relay frames as `text/event-stream`
//! - `GET /health` returns `{"status":"ok"}`
//!
//! The chat endpoint always answers 200 once the body is read: failures are
//! delivered as an error frame inside the stream.

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{RelayConfig, ServerConfig};
use crate::error::{Result, SousError};
use crate::relay::{ChatRequest, RelayEvent, UpstreamConnector, spawn_relay};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay tuning
    pub relay: RelayConfig,
    /// Largest accepted request body
    pub max_body_bytes: usize,
    /// Opens provider streams; shared, read-only
    pub connector: Arc<dyn UpstreamConnector>,
}

impl AppState {
    pub fn new(
        server: &ServerConfig,
        relay: RelayConfig,
        connector: Arc<dyn UpstreamConnector>,
    ) -> Self {
        Self {
            relay,
            max_body_bytes: server.max_body_bytes,
            connector,
        }
    }
}

/// The relay HTTP server
pub struct RelayServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl RelayServer {
    pub fn new(
        config: ServerConfig,
        relay: RelayConfig,
        connector: Arc<dyn UpstreamConnector>,
    ) -> Self {
        let state = Arc::new(AppState::new(&config, relay, connector));
        Self { config, state }
    }

    /// Start the server and listen until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let app = create_router(Arc::clone(&self.state));

        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .map_err(|e| SousError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting relay server on {addr}");
        match self.state.relay.max_duration() {
            Some(limit) => tracing::info!("Relay duration cap: {}s", limit.as_secs()),
            None => tracing::info!("Relay duration cap: disabled"),
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SousError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| SousError::Server(format!("Server error: {e}")))?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.max_body_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Relay a chat request as an event stream
///
/// The body is parsed here rather than with the `Json` extractor so that a
/// malformed request still gets the event-stream contract: one error frame.
async fn chat_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Rejected chat request: {e}");
            let event = RelayEvent::Error {
                message: format!("Invalid chat request: {e}"),
            };
            return event_stream_response(Body::from(event.to_frame()));
        }
    };

    let frames = spawn_relay(Arc::clone(&state.connector), request, &state.relay);
    event_stream_response(Body::from_stream(frames))
}

fn event_stream_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        body,
    )
        .into_response()
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
