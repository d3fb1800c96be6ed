//! Broadcast Fan-Out
//!
//! Delivers server frames to per-connection egress queues. Pure fan-out:
//! recipients are resolved from registry snapshots at publish time, and the
//! hub carries no business logic of its own.
//!
//! # Delivery semantics
//!
//! Targets are snapshotted at the moment of publish: a connection that
//! unsubscribes mid-delivery may or may not receive that specific frame,
//! but never a stale one after it has fully left the registry. Sends are
//! non-blocking; a full egress queue drops the frame for that connection
//! (lossy fan-out, counted in metrics) rather than stalling other
//! subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::application::ports::AlertPublisher;
use crate::domain::alert::AlertTriggered;
use crate::domain::quote::Quote;
use crate::domain::subscription::{ConnectionId, SubscriptionRegistry};
use crate::infrastructure::metrics;
use crate::infrastructure::ws::messages::{PortfolioUpdate, ServerMessage};

/// Shared broadcast hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

/// Fan-out hub over per-connection egress queues.
pub struct BroadcastHub {
    registry: Arc<SubscriptionRegistry>,
    sinks: RwLock<HashMap<ConnectionId, mpsc::Sender<ServerMessage>>>,
}

impl BroadcastHub {
    /// Create a hub resolving recipients from the given registry.
    #[must_use]
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            sinks: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a connection's egress queue.
    pub fn register_sink(&self, connection: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.sinks.write().insert(connection, sender);
    }

    /// Detach a connection's egress queue.
    pub fn remove_sink(&self, connection: ConnectionId) {
        self.sinks.write().remove(&connection);
    }

    /// Number of attached connections.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Deliver a price update to the symbol's current subscribers.
    ///
    /// Returns the number of connections the frame was queued for.
    pub fn publish_price(&self, quote: &Quote, initial: bool) -> usize {
        let targets = self.registry.symbol_subscribers(&quote.symbol);
        if targets.is_empty() {
            return 0;
        }

        let frame = ServerMessage::price_update(quote, initial);
        let delivered = self.deliver(&targets, &frame);
        metrics::record_price_updates(delivered as u64);
        delivered
    }

    /// Deliver a portfolio valuation to the user's portfolio-channel
    /// connections.
    pub fn publish_portfolio_update(&self, user_id: &str, update: PortfolioUpdate) -> usize {
        let targets = self.registry.portfolio_channel_members(user_id);
        self.deliver(&targets, &ServerMessage::PortfolioUpdate(update))
    }

    fn deliver(&self, targets: &[ConnectionId], frame: &ServerMessage) -> usize {
        let sinks = self.sinks.read();
        let mut delivered = 0;

        for connection in targets {
            let Some(sender) = sinks.get(connection) else {
                continue;
            };
            match sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    metrics::record_messages_dropped(1);
                    tracing::warn!(connection = %connection, "Egress queue full, dropping frame");
                }
                Err(TrySendError::Closed(_)) => {
                    // Connection is tearing down; disconnect cleanup removes
                    // the sink.
                }
            }
        }

        delivered
    }
}

#[async_trait]
impl AlertPublisher for BroadcastHub {
    /// Deliver an alert trigger: the full event to the user's alert-channel
    /// connections, plus a generic notification to every connection of that
    /// user regardless of channel.
    async fn publish_alert_triggered(&self, event: AlertTriggered) {
        let channel_members = self.registry.alert_channel_members(&event.user_id);
        let all_connections = self.registry.user_connections(&event.user_id);

        self.deliver(&channel_members, &ServerMessage::alert_triggered(&event));
        self.deliver(&all_connections, &ServerMessage::alert_notification(&event));
        metrics::record_alert_triggered();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::domain::alert::AlertCondition;

    fn quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            price: Decimal::from_str("205.31").unwrap(),
            change: Decimal::ZERO,
            change_percent: Decimal::ZERO,
            volume: 100,
            timestamp: Utc::now(),
            session: None,
        }
    }

    fn trigger_event(user: &str) -> AlertTriggered {
        AlertTriggered {
            alert_id: Uuid::new_v4(),
            user_id: user.to_string(),
            symbol: "AAPL".to_string(),
            condition: AlertCondition::Above,
            target_price: Decimal::from_str("200").unwrap(),
            current_price: Decimal::from_str("205").unwrap(),
            triggered_at: Utc::now(),
        }
    }

    struct Wired {
        registry: Arc<SubscriptionRegistry>,
        hub: BroadcastHub,
    }

    fn wired() -> Wired {
        let registry = Arc::new(SubscriptionRegistry::new());
        let hub = BroadcastHub::new(Arc::clone(&registry));
        Wired { registry, hub }
    }

    fn attach(
        wired: &Wired,
        user: Option<&str>,
        capacity: usize,
    ) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let connection = ConnectionId::new();
        wired
            .registry
            .register(connection, user.map(ToString::to_string));
        let (tx, rx) = mpsc::channel(capacity);
        wired.hub.register_sink(connection, tx);
        (connection, rx)
    }

    #[tokio::test]
    async fn price_updates_reach_only_subscribers() {
        let wired = wired();
        let (subscriber, mut subscriber_rx) = attach(&wired, None, 8);
        let (_bystander, mut bystander_rx) = attach(&wired, None, 8);
        wired
            .registry
            .subscribe(subscriber, &["AAPL".to_string()])
            .unwrap();

        let delivered = wired.hub.publish_price(&quote("AAPL"), false);

        assert_eq!(delivered, 1);
        assert!(matches!(
            subscriber_rx.try_recv().unwrap(),
            ServerMessage::PriceUpdate(_)
        ));
        assert!(bystander_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_delivers_nothing() {
        let wired = wired();
        let (_conn, mut rx) = attach(&wired, None, 8);

        assert_eq!(wired.hub.publish_price(&quote("AAPL"), false), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn removed_sink_is_skipped() {
        let wired = wired();
        let (subscriber, mut rx) = attach(&wired, None, 8);
        wired
            .registry
            .subscribe(subscriber, &["AAPL".to_string()])
            .unwrap();
        wired.hub.remove_sink(subscriber);

        assert_eq!(wired.hub.publish_price(&quote("AAPL"), false), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(wired.hub.sink_count(), 0);
    }

    #[tokio::test]
    async fn full_egress_queue_drops_frame() {
        let wired = wired();
        let (subscriber, mut rx) = attach(&wired, None, 1);
        wired
            .registry
            .subscribe(subscriber, &["AAPL".to_string()])
            .unwrap();

        assert_eq!(wired.hub.publish_price(&quote("AAPL"), false), 1);
        // Queue is full now; the second publish drops for this connection.
        assert_eq!(wired.hub.publish_price(&quote("AAPL"), false), 0);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn alert_trigger_fans_out_to_channel_and_all_user_connections() {
        let wired = wired();
        let (member, mut member_rx) = attach(&wired, Some("user-1"), 8);
        let (_other, mut other_rx) = attach(&wired, Some("user-1"), 8);
        let (_stranger, mut stranger_rx) = attach(&wired, Some("user-2"), 8);
        wired.registry.join_alerts(member).unwrap();

        wired.hub.publish_alert_triggered(trigger_event("user-1")).await;

        // Channel member gets the full trigger plus the notification.
        let mut member_frames = vec![
            member_rx.try_recv().unwrap(),
            member_rx.try_recv().unwrap(),
        ];
        member_frames.sort_by_key(|frame| {
            matches!(frame, ServerMessage::Notification { .. })
        });
        assert!(matches!(member_frames[0], ServerMessage::AlertTriggered(_)));
        assert!(matches!(member_frames[1], ServerMessage::Notification { .. }));

        // The user's other connection gets only the generic notification.
        assert!(matches!(
            other_rx.try_recv().unwrap(),
            ServerMessage::Notification { .. }
        ));
        assert!(other_rx.try_recv().is_err());

        // Other users see nothing.
        assert!(stranger_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn portfolio_updates_reach_channel_members_only() {
        let wired = wired();
        let (member, mut member_rx) = attach(&wired, Some("user-1"), 8);
        let (_other, mut other_rx) = attach(&wired, Some("user-1"), 8);
        wired.registry.join_portfolio(member).unwrap();

        let update = PortfolioUpdate {
            total_value: Decimal::from_str("125000.00").unwrap(),
            total_gain: Decimal::from_str("5000.00").unwrap(),
            total_gain_percent: Decimal::from_str("4.17").unwrap(),
            day_change: Decimal::ZERO,
            day_change_percent: Decimal::ZERO,
            timestamp: Utc::now(),
        };
        let delivered = wired.hub.publish_portfolio_update("user-1", update);

        assert_eq!(delivered, 1);
        assert!(matches!(
            member_rx.try_recv().unwrap(),
            ServerMessage::PortfolioUpdate(_)
        ));
        assert!(other_rx.try_recv().is_err());
    }
}
