#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Quote Stream Hub - Real-Time Dashboard Core
//!
//! WebSocket service that multiplexes many dashboard clients onto a small
//! number of periodic upstream quote polls, and drives the price-alert
//! state machine off the same quote stream.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types and subscription bookkeeping
//!   - `quote`: Quote snapshots and symbol normalization
//!   - `subscription`: Symbol → subscriber reference counting, channels
//!   - `alert`: Alert entity and condition state machine
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the quote provider, alert store, identity
//!   - `services`: Alert evaluation against the quote stream
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `ws`: Client-facing WebSocket server and protocol
//!   - `poller`: Per-symbol polling tasks
//!   - `broadcast`: Frame fan-out to connection egress queues
//!   - `provider` / `store` / `identity`: Port adapters
//!   - `config` / `health` / `metrics` / `telemetry`: Operations
//!
//! # Data Flow
//!
//! ```text
//!                 ┌──────────────┐   subscribe/unsubscribe   ┌─────────────┐
//! Client 1 ──────►│  WebSocket   │──────────────────────────►│Subscription │
//! Client 2 ──────►│   Sessions   │                           │  Registry   │
//! Client N ──────►│              │                           └──────┬──────┘
//!                 └──────▲───────┘                        start/stop│
//!                        │ frames                                   ▼
//!                 ┌──────┴───────┐   quotes   ┌─────────────┐ ┌───────────┐
//!                 │  Broadcast   │◄───────────┤    Alert    │◄┤   Quote   │──► Provider
//!                 │     Hub      │◄───────────┤  Evaluator  │ │  Poller   │    (HTTP)
//!                 └──────────────┘            └─────────────┘ └───────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::alert::{Alert, AlertCondition, AlertId, AlertStatus, AlertTriggered, UserId};
pub use domain::quote::{Quote, SessionStats, Symbol};
pub use domain::subscription::{
    ChannelJoinError, ConnectionId, DisconnectOutcome, RegistryStats, SubscribeError,
    SubscribeOutcome, SubscriptionRegistry, UnsubscribeOutcome,
};

// Ports
pub use application::ports::{
    AlertPublisher, AlertStore, Identity, IdentityVerifier, MarketDataProvider, ProviderError,
    StoreError, VerifyError,
};

// Services
pub use application::services::alerts::{AlertCheckOutcome, AlertEvaluator};

// Infrastructure config
pub use infrastructure::config::{ConfigError, HubConfig};

// Broadcast hub
pub use infrastructure::broadcast::{BroadcastHub, SharedBroadcastHub};

// Poller
pub use infrastructure::poller::{QuotePoller, QuotePollerConfig};

// WebSocket server (router exposed for integration tests)
pub use infrastructure::ws::messages::{ClientMessage, PortfolioUpdate, PriceUpdate, ServerMessage};
pub use infrastructure::ws::{ConnectionManager, WsServer, WsServerError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Port adapters
pub use infrastructure::identity::HmacTokenVerifier;
pub use infrastructure::provider::{HttpMarketDataProvider, ProviderConfig};
pub use infrastructure::store::InMemoryAlertStore;

// Metrics
pub use infrastructure::metrics::{get_metrics_handle, init_metrics};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
