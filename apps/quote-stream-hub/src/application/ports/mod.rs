//! Port Interfaces
//!
//! Contracts between the real-time engine and its external collaborators,
//! following the hexagonal architecture pattern. Infrastructure adapters
//! implement these; the engine never sees past them.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`MarketDataProvider`]: upstream quote API (cached and rate limited on
//!   its side; every error here is transient)
//! - [`AlertStore`]: alert persistence owned by the dashboard CRUD surface
//! - [`IdentityVerifier`]: bearer-credential verification
//! - [`AlertPublisher`]: fan-out of alert-triggered notifications

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::alert::{Alert, AlertId, AlertTriggered, UserId};
use crate::domain::quote::Quote;

// =============================================================================
// Errors
// =============================================================================

/// Failure fetching a quote from the upstream provider.
///
/// Always treated as transient: the affected poll cycle is skipped and
/// nothing is surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Transport failure, timeout, or non-success response.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    /// The provider does not know the symbol.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    /// The provider responded with a payload that failed to parse.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Failure reading or writing alert state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The alert already left ACTIVE; the transition is refused.
    ///
    /// This is how the per-alert critical section is enforced, including
    /// across process restarts: first write wins, later writers no-op.
    #[error("alert is already in a terminal state")]
    AlreadyTerminal,
    /// No alert with the given id exists.
    #[error("alert not found")]
    NotFound,
    /// The store could not be reached.
    #[error("alert store unavailable: {0}")]
    Unavailable(String),
}

/// Failure verifying a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// The credential is garbled, unsigned, or signed with the wrong key.
    #[error("invalid credential")]
    InvalidCredential,
    /// The credential was valid once but has expired.
    #[error("credential expired")]
    Expired,
}

// =============================================================================
// Identity
// =============================================================================

/// Identity attached to a connection after successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Opaque user identifier.
    pub user_id: UserId,
}

// =============================================================================
// Ports
// =============================================================================

/// Upstream market-data quote API.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch the latest quote for a symbol.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError>;
}

/// Alert persistence owned by the dashboard CRUD surface.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// ACTIVE alerts watching a symbol.
    async fn list_active(&self, symbol: &str) -> Result<Vec<Alert>, StoreError>;

    /// ACTIVE alerts owned by a user, across all symbols.
    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Alert>, StoreError>;

    /// Conditionally transition an alert ACTIVE → TRIGGERED.
    ///
    /// Must fail with [`StoreError::AlreadyTerminal`] unless the alert is
    /// still ACTIVE at write time.
    async fn mark_triggered(&self, alert_id: AlertId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Bearer-credential verification. Token issuance is external.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify a credential presented at handshake.
    async fn verify(&self, credential: &str) -> Result<Identity, VerifyError>;
}

/// Outbound delivery of alert-triggered notifications.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    /// Deliver an alert-triggered event to the owning user's connections.
    async fn publish_alert_triggered(&self, event: AlertTriggered);
}
