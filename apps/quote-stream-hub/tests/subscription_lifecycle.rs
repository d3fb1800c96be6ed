//! Subscription Lifecycle Integration Tests
//!
//! Drives the registry → poller → broadcast path end to end with a scripted
//! provider: immediate fetches on activation, single task per symbol,
//! teardown on last unsubscribe/disconnect, and recovery after failed
//! cycles.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;

use quote_stream_hub::{
    AlertEvaluator, AlertPublisher, AlertStore, BroadcastHub, ConnectionId, InMemoryAlertStore,
    MarketDataProvider, PriceUpdate, ProviderError, Quote, QuotePoller, QuotePollerConfig,
    ServerMessage, SessionStats, SubscriptionRegistry,
};

// =============================================================================
// Scripted Provider
// =============================================================================

#[derive(Default)]
struct ScriptedProvider {
    prices: Mutex<HashMap<String, Decimal>>,
    failing: Mutex<HashSet<String>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl ScriptedProvider {
    fn set_price(&self, symbol: &str, price: &str) {
        self.prices
            .lock()
            .insert(symbol.to_string(), Decimal::from_str(price).unwrap());
    }

    fn fail(&self, symbol: &str) {
        self.failing.lock().insert(symbol.to_string());
    }

    fn recover(&self, symbol: &str) {
        self.failing.lock().remove(symbol);
    }

    fn fetch_count(&self, symbol: &str) -> usize {
        self.fetches.lock().get(symbol).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        *self.fetches.lock().entry(symbol.to_string()).or_insert(0) += 1;

        if self.failing.lock().contains(symbol) {
            return Err(ProviderError::Unavailable("scripted outage".to_string()));
        }

        let price = self
            .prices
            .lock()
            .get(symbol)
            .copied()
            .unwrap_or_else(|| Decimal::from_str("100.00").unwrap());

        Ok(Quote {
            symbol: symbol.to_string(),
            price,
            change: Decimal::from_str("1.50").unwrap(),
            change_percent: Decimal::from_str("1.52").unwrap(),
            volume: 1_000_000,
            timestamp: Utc::now(),
            session: Some(SessionStats {
                high: price,
                low: price,
                open: price,
                previous_close: price,
            }),
        })
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    registry: Arc<SubscriptionRegistry>,
    hub: Arc<BroadcastHub>,
    poller: Arc<QuotePoller>,
    provider: Arc<ScriptedProvider>,
}

fn harness(interval: Duration) -> Harness {
    let registry = Arc::new(SubscriptionRegistry::new());
    let hub = Arc::new(BroadcastHub::new(Arc::clone(&registry)));
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(InMemoryAlertStore::new());
    let evaluator = Arc::new(AlertEvaluator::new(
        store as Arc<dyn AlertStore>,
        Arc::clone(&provider) as Arc<dyn MarketDataProvider>,
        Arc::clone(&hub) as Arc<dyn AlertPublisher>,
    ));
    let poller = Arc::new(QuotePoller::new(
        QuotePollerConfig { interval },
        Arc::clone(&provider) as Arc<dyn MarketDataProvider>,
        Arc::clone(&hub),
        evaluator,
    ));

    Harness {
        registry,
        hub,
        poller,
        provider,
    }
}

impl Harness {
    fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let connection = ConnectionId::new();
        self.registry.register(connection, None);
        let (tx, rx) = mpsc::channel(64);
        self.hub.register_sink(connection, tx);
        (connection, rx)
    }

    fn subscribe(&self, connection: ConnectionId, symbols: &[&str]) {
        let raw: Vec<String> = symbols.iter().map(ToString::to_string).collect();
        let outcome = self.registry.subscribe(connection, &raw).unwrap();
        self.poller.apply(&outcome.activated, &[]);
    }

    fn unsubscribe(&self, connection: ConnectionId, symbols: &[&str]) {
        let raw: Vec<String> = symbols.iter().map(ToString::to_string).collect();
        let outcome = self.registry.unsubscribe(connection, &raw).unwrap();
        self.poller.apply(&[], &outcome.deactivated);
    }

    fn disconnect(&self, connection: ConnectionId) {
        self.hub.remove_sink(connection);
        let outcome = self.registry.disconnect(connection);
        self.poller.apply(&[], &outcome.deactivated);
    }

    /// The invariant at the heart of the registry/poller pairing.
    fn assert_task_parity(&self, symbol: &str) {
        assert_eq!(
            self.registry.subscriber_count(symbol) == 0,
            !self.poller.is_active(symbol),
            "subscriber count and poll task disagree for {symbol}"
        );
    }
}

async fn next_price(rx: &mut mpsc::Receiver<ServerMessage>) -> PriceUpdate {
    loop {
        let frame = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for price update")
            .expect("sink closed");
        if let ServerMessage::PriceUpdate(update) = frame {
            return update;
        }
    }
}

fn drain(rx: &mut mpsc::Receiver<ServerMessage>) {
    while rx.try_recv().is_ok() {}
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn first_subscription_fetches_immediately_with_session_stats() {
    let h = harness(Duration::from_secs(60));
    let (conn, mut rx) = h.connect();
    h.provider.set_price("AAPL", "205.31");

    h.subscribe(conn, &["AAPL"]);

    let update = next_price(&mut rx).await;
    assert_eq!(update.symbol, "AAPL");
    assert_eq!(update.price, Decimal::from_str("205.31").unwrap());
    assert!(update.previous_close.is_some(), "initial delivery carries session stats");
    assert_eq!(h.provider.fetch_count("AAPL"), 1);
    h.assert_task_parity("AAPL");
}

#[tokio::test]
async fn two_quick_subscribers_share_one_task_and_one_immediate_fetch() {
    let h = harness(Duration::from_secs(60));
    let (first, mut first_rx) = h.connect();
    let (second, _second_rx) = h.connect();

    h.subscribe(first, &["GOOGL"]);
    h.subscribe(second, &["GOOGL"]);

    let _ = next_price(&mut first_rx).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.provider.fetch_count("GOOGL"), 1, "single immediate fetch");
    assert_eq!(h.poller.active_count(), 1);
    assert_eq!(h.registry.subscriber_count("GOOGL"), 2);
    h.assert_task_parity("GOOGL");
}

#[tokio::test]
async fn sole_subscriber_disconnect_stops_polling() {
    let h = harness(Duration::from_millis(150));
    let (conn, mut rx) = h.connect();

    h.subscribe(conn, &["TSLA"]);
    let _ = next_price(&mut rx).await;

    h.disconnect(conn);
    h.assert_task_parity("TSLA");
    assert!(!h.poller.is_active("TSLA"));

    // Allow an in-flight cycle to settle, then confirm fetching stopped.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let settled = h.provider.fetch_count("TSLA");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.provider.fetch_count("TSLA"), settled);
}

#[tokio::test]
async fn remaining_subscriber_keeps_receiving_after_peer_disconnects() {
    let h = harness(Duration::from_millis(150));
    let (first, _first_rx) = h.connect();
    let (second, mut second_rx) = h.connect();

    h.subscribe(first, &["AAPL"]);
    h.subscribe(second, &["AAPL"]);
    h.disconnect(first);

    assert_eq!(h.registry.subscriber_count("AAPL"), 1);
    assert!(h.poller.is_active("AAPL"));

    drain(&mut second_rx);
    let update = next_price(&mut second_rx).await;
    assert_eq!(update.symbol, "AAPL");
    h.assert_task_parity("AAPL");
}

#[tokio::test]
async fn resubscription_starts_a_fresh_task_with_a_fresh_immediate_fetch() {
    let h = harness(Duration::from_secs(60));
    let (conn, mut rx) = h.connect();

    h.subscribe(conn, &["NVDA"]);
    let _ = next_price(&mut rx).await;
    assert_eq!(h.provider.fetch_count("NVDA"), 1);

    h.unsubscribe(conn, &["NVDA"]);
    assert!(!h.poller.is_active("NVDA"));
    h.assert_task_parity("NVDA");

    h.subscribe(conn, &["NVDA"]);
    let update = next_price(&mut rx).await;
    // The interval is a minute, so this delivery can only be the fresh
    // activation fetch.
    assert_eq!(h.provider.fetch_count("NVDA"), 2);
    assert!(update.previous_close.is_some());
    h.assert_task_parity("NVDA");
}

#[tokio::test]
async fn failed_fetch_skips_the_cycle_and_recovers_on_schedule() {
    let h = harness(Duration::from_millis(200));
    let (conn, mut rx) = h.connect();
    h.provider.fail("MSFT");

    h.subscribe(conn, &["MSFT"]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Fetches happened, but nothing was published.
    assert!(h.provider.fetch_count("MSFT") >= 1);
    assert!(rx.try_recv().is_err(), "no update for a failed cycle");
    assert!(h.poller.is_active("MSFT"), "failure never tears the task down");

    h.provider.recover("MSFT");
    h.provider.set_price("MSFT", "431.00");

    let update = next_price(&mut rx).await;
    assert_eq!(update.price, Decimal::from_str("431.00").unwrap());
    h.assert_task_parity("MSFT");
}

#[tokio::test]
async fn unsubscribing_one_of_many_symbols_only_stops_that_task() {
    let h = harness(Duration::from_secs(60));
    let (conn, mut rx) = h.connect();

    h.subscribe(conn, &["AAPL", "MSFT"]);
    let _ = next_price(&mut rx).await;
    assert_eq!(h.poller.active_count(), 2);

    h.unsubscribe(conn, &["AAPL"]);

    assert!(!h.poller.is_active("AAPL"));
    assert!(h.poller.is_active("MSFT"));
    h.assert_task_parity("AAPL");
    h.assert_task_parity("MSFT");
}
