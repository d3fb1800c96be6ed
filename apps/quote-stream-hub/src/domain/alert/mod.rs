//! Price Alert Entity and Condition State Machine
//!
//! Alerts are owned by the dashboard's persistence layer; this core only
//! reads ACTIVE alerts for a symbol and performs the ACTIVE → TRIGGERED
//! transition. CANCELLED is written exclusively by the external CRUD
//! surface. Both TRIGGERED and CANCELLED are terminal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::quote::Symbol;

/// Unique alert identifier.
pub type AlertId = Uuid;

/// Opaque user identifier attached to an authenticated session.
pub type UserId = String;

// =============================================================================
// Conditions
// =============================================================================

/// Price condition attached to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCondition {
    /// Trigger once the price is at or above the target.
    Above,
    /// Trigger once the price is at or below the target.
    Below,
    /// Trigger when the price crosses above the target.
    CrossesAbove,
    /// Trigger when the price crosses below the target.
    CrossesBelow,
}

impl AlertCondition {
    /// Wire name of the condition.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Above => "ABOVE",
            Self::Below => "BELOW",
            Self::CrossesAbove => "CROSSES_ABOVE",
            Self::CrossesBelow => "CROSSES_BELOW",
        }
    }

    /// Evaluate the condition against the current price.
    ///
    /// No prior price is retained per alert, so the crossing conditions
    /// evaluate against the current price only and behave like their
    /// threshold counterparts.
    #[must_use]
    pub fn is_met(self, price: Decimal, target: Decimal) -> bool {
        match self {
            Self::Above | Self::CrossesAbove => price >= target,
            Self::Below | Self::CrossesBelow => price <= target,
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Lifecycle status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    /// Eligible for evaluation.
    Active,
    /// Condition was met; terminal.
    Triggered,
    /// Cancelled by its owner; terminal.
    Cancelled,
}

impl AlertStatus {
    /// Whether this status permits no further transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Triggered | Self::Cancelled)
    }
}

// =============================================================================
// Entity
// =============================================================================

/// A price alert owned by a dashboard user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier.
    pub id: AlertId,
    /// Owning user.
    pub user_id: UserId,
    /// Normalized symbol the alert watches.
    pub symbol: Symbol,
    /// Price condition.
    pub condition: AlertCondition,
    /// Target price the condition compares against.
    pub target_price: Decimal,
    /// Lifecycle status.
    pub status: AlertStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on the transition to TRIGGERED.
    pub triggered_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Whether the alert is still eligible for evaluation.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, AlertStatus::Active)
    }
}

/// Domain event emitted when an alert transitions to TRIGGERED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertTriggered {
    /// The triggered alert.
    pub alert_id: AlertId,
    /// Owning user, addressed by the broadcaster.
    pub user_id: UserId,
    /// Symbol the alert watched.
    pub symbol: Symbol,
    /// Condition that was met.
    pub condition: AlertCondition,
    /// Target price of the alert.
    pub target_price: Decimal,
    /// Price that met the condition.
    pub current_price: Decimal,
    /// Transition timestamp, as persisted.
    pub triggered_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================
