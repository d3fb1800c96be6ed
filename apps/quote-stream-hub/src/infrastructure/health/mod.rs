//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, subscription status reporting, and
//! Prometheus metrics. Used by container orchestrators, load balancers, and
//! monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::broadcast::SharedBroadcastHub;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::poller::QuotePoller;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "degraded".
    pub status: HealthStatus,
    /// Hub version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Connection counts.
    pub connections: ConnectionStatus,
    /// Subscription and polling counts.
    pub subscriptions: SubscriptionStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Internal bookkeeping is inconsistent; the hub keeps serving.
    Degraded,
}

/// Live connection counts.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    /// Connections with an attached egress queue.
    pub total: usize,
    /// Connections with an attached identity.
    pub authenticated: usize,
}

/// Subscription and polling counts.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Symbols with at least one subscriber.
    pub symbols: usize,
    /// Active per-symbol poll tasks.
    pub poll_tasks: usize,
    /// Users with an alert-channel connection.
    pub alert_channel_users: usize,
    /// Users with a portfolio-channel connection.
    pub portfolio_channel_users: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    registry: Arc<SubscriptionRegistry>,
    hub: SharedBroadcastHub,
    poller: Arc<QuotePoller>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        registry: Arc<SubscriptionRegistry>,
        hub: SharedBroadcastHub,
        poller: Arc<QuotePoller>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            registry,
            hub,
            poller,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    (StatusCode::OK, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler() -> impl IntoResponse {
    // The hub is ready as soon as it listens; the upstream provider is
    // polled lazily and its failures are transient by contract.
    (StatusCode::OK, "READY")
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let registry_stats = state.registry.stats();
    let poll_tasks = state.poller.active_count();

    HealthResponse {
        status: determine_health_status(registry_stats.symbols, poll_tasks),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connections: ConnectionStatus {
            total: state.hub.sink_count(),
            authenticated: registry_stats.authenticated,
        },
        subscriptions: SubscriptionStatus {
            symbols: registry_stats.symbols,
            poll_tasks,
            alert_channel_users: registry_stats.alert_channel_users,
            portfolio_channel_users: registry_stats.portfolio_channel_users,
        },
    }
}

/// Every subscribed symbol must have exactly one poll task; a mismatch is
/// visible here before it is visible to users.
fn determine_health_status(symbols: usize, poll_tasks: usize) -> HealthStatus {
    if symbols == poll_tasks {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn matching_counts_are_healthy() {
        assert_eq!(determine_health_status(3, 3), HealthStatus::Healthy);
        assert_eq!(determine_health_status(0, 0), HealthStatus::Healthy);
    }

    #[test]
    fn mismatched_counts_are_degraded() {
        assert_eq!(determine_health_status(3, 2), HealthStatus::Degraded);
        assert_eq!(determine_health_status(0, 1), HealthStatus::Degraded);
    }
}
