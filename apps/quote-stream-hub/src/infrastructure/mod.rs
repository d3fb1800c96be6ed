//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the servers and tasks that drive
//! them.

/// Fan-out of server frames to per-connection egress queues.
pub mod broadcast;

/// Configuration loaded from environment variables.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Bearer token verification.
pub mod identity;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Per-symbol quote polling tasks.
pub mod poller;

/// HTTP client for the upstream quote API.
pub mod provider;

/// In-memory alert store.
pub mod store;

/// Tracing initialization.
pub mod telemetry;

/// Client-facing WebSocket server and protocol.
pub mod ws;
