//! Alert Evaluation Service
//!
//! Consumes quotes from the polling layer, evaluates every ACTIVE alert on
//! the quoted symbol, and performs the ACTIVE → TRIGGERED transition exactly
//! once per alert.
//!
//! # Double-trigger avoidance
//!
//! "Read ACTIVE alert, decide to trigger, write TRIGGERED" is one critical
//! section per alert id. The write is the store's conditional transition: it
//! fails with `AlreadyTerminal` unless the alert is still ACTIVE, so when a
//! tick-driven evaluation races the on-demand check the first write wins and
//! the loser silently no-ops. Only the winner publishes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::application::ports::{
    AlertPublisher, AlertStore, MarketDataProvider, StoreError,
};
use crate::domain::alert::{Alert, AlertTriggered};
use crate::domain::quote::{Quote, Symbol};

/// Summary of a manual "check all alerts for user" run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertCheckOutcome {
    /// ACTIVE alerts considered.
    pub alerts_evaluated: usize,
    /// Distinct symbols fetched (one fetch per symbol, not per alert).
    pub symbols_fetched: usize,
    /// Alerts transitioned to TRIGGERED by this run.
    pub triggered: usize,
}

/// Evaluates quotes against ACTIVE alerts and publishes trigger events.
pub struct AlertEvaluator {
    store: Arc<dyn AlertStore>,
    provider: Arc<dyn MarketDataProvider>,
    publisher: Arc<dyn AlertPublisher>,
}

impl AlertEvaluator {
    /// Create an evaluator over the given ports.
    #[must_use]
    pub fn new(
        store: Arc<dyn AlertStore>,
        provider: Arc<dyn MarketDataProvider>,
        publisher: Arc<dyn AlertPublisher>,
    ) -> Self {
        Self {
            store,
            provider,
            publisher,
        }
    }

    /// Evaluate every ACTIVE alert on the quoted symbol.
    ///
    /// Called once per successfully fetched quote. Store failures are logged
    /// and skipped; the quote stream is never interrupted by alert state.
    pub async fn evaluate_quote(&self, quote: &Quote) {
        let alerts = match self.store.list_active(&quote.symbol).await {
            Ok(alerts) => alerts,
            Err(error) => {
                tracing::warn!(symbol = %quote.symbol, %error, "Failed to load active alerts");
                return;
            }
        };

        for alert in &alerts {
            if alert.condition.is_met(quote.price, alert.target_price) {
                self.trigger(alert, quote.price).await;
            }
        }
    }

    /// Re-evaluate all of a user's ACTIVE alerts on demand.
    ///
    /// Fetches each distinct symbol once and runs the identical per-alert
    /// evaluation as the tick-driven path, so running both concurrently can
    /// never produce two TRIGGERED writes for the same alert. Symbols whose
    /// fetch fails are skipped; their alerts stay ACTIVE.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the user's alerts cannot be listed.
    pub async fn check_user_alerts(&self, user_id: &str) -> Result<AlertCheckOutcome, StoreError> {
        let alerts = self.store.list_active_for_user(user_id).await?;

        let mut quotes: HashMap<Symbol, Quote> = HashMap::new();
        let mut unavailable: Vec<Symbol> = Vec::new();
        for alert in &alerts {
            if quotes.contains_key(&alert.symbol) || unavailable.contains(&alert.symbol) {
                continue;
            }
            match self.provider.get_quote(&alert.symbol).await {
                Ok(quote) => {
                    quotes.insert(alert.symbol.clone(), quote);
                }
                Err(error) => {
                    tracing::warn!(
                        symbol = %alert.symbol,
                        %error,
                        "Quote fetch failed during manual alert check, skipping symbol"
                    );
                    unavailable.push(alert.symbol.clone());
                }
            }
        }

        let mut triggered = 0;
        for alert in &alerts {
            if let Some(quote) = quotes.get(&alert.symbol)
                && alert.condition.is_met(quote.price, alert.target_price)
                && self.trigger(alert, quote.price).await
            {
                triggered += 1;
            }
        }

        Ok(AlertCheckOutcome {
            alerts_evaluated: alerts.len(),
            symbols_fetched: quotes.len(),
            triggered,
        })
    }

    /// Attempt the ACTIVE → TRIGGERED transition and publish on success.
    ///
    /// Returns whether this call won the transition.
    async fn trigger(&self, alert: &Alert, current_price: Decimal) -> bool {
        let triggered_at = Utc::now();

        match self.store.mark_triggered(alert.id, triggered_at).await {
            Ok(()) => {
                tracing::info!(
                    alert_id = %alert.id,
                    symbol = %alert.symbol,
                    condition = alert.condition.as_str(),
                    target = %alert.target_price,
                    price = %current_price,
                    "Alert triggered"
                );
                self.publisher
                    .publish_alert_triggered(AlertTriggered {
                        alert_id: alert.id,
                        user_id: alert.user_id.clone(),
                        symbol: alert.symbol.clone(),
                        condition: alert.condition,
                        target_price: alert.target_price,
                        current_price,
                        triggered_at,
                    })
                    .await;
                true
            }
            Err(StoreError::AlreadyTerminal) => {
                // Lost the race to another evaluation path; first write wins.
                tracing::debug!(alert_id = %alert.id, "Alert already terminal, skipping");
                false
            }
            Err(error) => {
                tracing::warn!(alert_id = %alert.id, %error, "Failed to persist alert trigger");
                false
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
