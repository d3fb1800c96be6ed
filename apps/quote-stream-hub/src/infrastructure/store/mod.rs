//! In-Memory Alert Store
//!
//! Shared in-process alert records implementing the [`AlertStore`] port.
//! Stands in for the dashboard's persistence layer in this deployment and
//! in tests; the CRUD surface owns creation and cancellation
//! ([`InMemoryAlertStore::insert`] / [`InMemoryAlertStore::cancel`]), the
//! engine only reads ACTIVE alerts and writes the TRIGGERED transition.
//!
//! The transition is a conditional write under the store lock: it refuses
//! any alert that already left ACTIVE, which makes "evaluate and trigger"
//! first-write-wins across concurrent evaluation paths.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::application::ports::{AlertStore, StoreError};
use crate::domain::alert::{Alert, AlertId, AlertStatus};

/// Thread-safe in-memory alert records.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: RwLock<HashMap<AlertId, Alert>>,
}

impl InMemoryAlertStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an alert record (CRUD-surface write).
    pub fn insert(&self, alert: Alert) {
        self.alerts.write().insert(alert.id, alert);
    }

    /// Cancel an ACTIVE alert (CRUD-surface write). Terminal states refuse.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown ids and
    /// [`StoreError::AlreadyTerminal`] when the alert already left ACTIVE.
    pub fn cancel(&self, alert_id: AlertId) -> Result<(), StoreError> {
        let mut alerts = self.alerts.write();
        let alert = alerts.get_mut(&alert_id).ok_or(StoreError::NotFound)?;

        if alert.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal);
        }

        alert.status = AlertStatus::Cancelled;
        Ok(())
    }

    /// Fetch a snapshot of one alert.
    #[must_use]
    pub fn get(&self, alert_id: AlertId) -> Option<Alert> {
        self.alerts.read().get(&alert_id).cloned()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn list_active(&self, symbol: &str) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .alerts
            .read()
            .values()
            .filter(|alert| alert.is_active() && alert.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .alerts
            .read()
            .values()
            .filter(|alert| alert.is_active() && alert.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_triggered(&self, alert_id: AlertId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut alerts = self.alerts.write();
        let alert = alerts.get_mut(&alert_id).ok_or(StoreError::NotFound)?;

        if alert.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal);
        }

        alert.status = AlertStatus::Triggered;
        alert.triggered_at = Some(at);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
