//! WebSocket Endpoint
//!
//! Client-facing WebSocket server. The dashboard connects to `GET /ws`,
//! optionally presenting a bearer credential as an `Authorization: Bearer`
//! header or a `?token=` query parameter (browsers cannot set headers on
//! WebSocket upgrades).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub mod messages;
pub mod session;

pub use session::ConnectionManager;

// =============================================================================
// Server
// =============================================================================

/// WebSocket HTTP server.
pub struct WsServer {
    port: u16,
    manager: Arc<ConnectionManager>,
    cancel: CancellationToken,
}

impl WsServer {
    /// Create a server on the given port.
    #[must_use]
    pub const fn new(port: u16, manager: Arc<ConnectionManager>, cancel: CancellationToken) -> Self {
        Self {
            port,
            manager,
            cancel,
        }
    }

    /// Build the router. Exposed for integration tests that bind their own
    /// listener.
    #[must_use]
    pub fn router(manager: Arc<ConnectionManager>) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(manager)
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`WsServerError`] if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), WsServerError> {
        let app = Self::router(self.manager);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WsServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "WebSocket server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| WsServerError::ServerFailed(e.to_string()))?;

        tracing::info!("WebSocket server stopped");
        Ok(())
    }
}

// =============================================================================
// Handler
// =============================================================================

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(manager): State<Arc<ConnectionManager>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let credential = bearer_token(&headers).or(query.token);
    ws.on_upgrade(move |socket| manager.handle_socket(socket, credential))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

// =============================================================================
// Errors
// =============================================================================

/// WebSocket server errors.
#[derive(Debug, thiserror::Error)]
pub enum WsServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
