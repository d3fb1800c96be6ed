//! Per-Symbol Quote Polling
//!
//! Owns exactly one periodic fetch task per actively subscribed symbol.
//! Activation fetches once immediately (best effort) and then on a fixed
//! interval; deactivation cancels the task. The cancellable task handle and
//! the symbol key live in one map entry, so activation and teardown are a
//! single map update that cannot drift from the subscriber counts that
//! caused them.
//!
//! # Fetch discipline
//!
//! One fetch in flight per symbol, never two: the fetch is awaited inside
//! the tick loop and missed ticks are delayed, so a slow upstream call
//! pushes the next cycle out instead of overlapping it. A fetch that is
//! already under way when the symbol deactivates completes and its result
//! is discarded.
//!
//! Fetch failures are logged and skip the cycle. They never tear down the
//! task, other symbols, or any client session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::MarketDataProvider;
use crate::application::services::alerts::AlertEvaluator;
use crate::domain::quote::Symbol;
use crate::infrastructure::broadcast::SharedBroadcastHub;
use crate::infrastructure::metrics::{self, FetchResult};

/// Default fetch interval per symbol.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the quote poller.
#[derive(Debug, Clone, Copy)]
pub struct QuotePollerConfig {
    /// Fixed fetch interval per active symbol.
    pub interval: Duration,
}

impl Default for QuotePollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Cancellable handle to one symbol's scheduled fetch task.
#[derive(Debug)]
struct PollTask {
    cancel: CancellationToken,
}

/// Owns the per-symbol polling tasks.
pub struct QuotePoller {
    config: QuotePollerConfig,
    provider: Arc<dyn MarketDataProvider>,
    hub: SharedBroadcastHub,
    evaluator: Arc<AlertEvaluator>,
    tasks: Mutex<HashMap<Symbol, PollTask>>,
    shutdown: CancellationToken,
}

impl QuotePoller {
    /// Create a poller over the given provider, hub and evaluator.
    #[must_use]
    pub fn new(
        config: QuotePollerConfig,
        provider: Arc<dyn MarketDataProvider>,
        hub: SharedBroadcastHub,
        evaluator: Arc<AlertEvaluator>,
    ) -> Self {
        Self {
            config,
            provider,
            hub,
            evaluator,
            tasks: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start polling a symbol. Idempotent: a symbol that already has a task
    /// keeps it, so two quick subscribers produce a single immediate fetch.
    ///
    /// Returns whether a new task was spawned.
    pub fn start(&self, symbol: &str) -> bool {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(symbol) {
            return false;
        }

        let cancel = self.shutdown.child_token();
        tokio::spawn(poll_loop(
            symbol.to_string(),
            self.config.interval,
            Arc::clone(&self.provider),
            Arc::clone(&self.hub),
            Arc::clone(&self.evaluator),
            cancel.clone(),
        ));
        tasks.insert(symbol.to_string(), PollTask { cancel });

        metrics::set_poll_tasks(tasks.len() as f64);
        tracing::info!(symbol, "Started quote polling");
        true
    }

    /// Stop polling a symbol and release its task. An in-flight fetch
    /// completes and its result is discarded.
    ///
    /// Returns whether a task existed.
    pub fn stop(&self, symbol: &str) -> bool {
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.remove(symbol) else {
            return false;
        };
        task.cancel.cancel();

        metrics::set_poll_tasks(tasks.len() as f64);
        tracing::info!(symbol, "Stopped quote polling");
        true
    }

    /// Apply a registry outcome: start activated symbols, stop deactivated
    /// ones.
    pub fn apply(&self, activated: &[Symbol], deactivated: &[Symbol]) {
        for symbol in activated {
            self.start(symbol);
        }
        for symbol in deactivated {
            self.stop(symbol);
        }
    }

    /// Whether a symbol currently has a poll task.
    #[must_use]
    pub fn is_active(&self, symbol: &str) -> bool {
        self.tasks.lock().contains_key(symbol)
    }

    /// Number of active poll tasks.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel every poll task (process shutdown).
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.lock().clear();
        metrics::set_poll_tasks(0.0);
    }
}

/// One symbol's fetch loop: immediate fetch, then fixed-interval cycles
/// until cancelled.
async fn poll_loop(
    symbol: Symbol,
    interval: Duration,
    provider: Arc<dyn MarketDataProvider>,
    hub: SharedBroadcastHub,
    evaluator: Arc<AlertEvaluator>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately: the activation fetch.
    ticker.tick().await;
    poll_once(&symbol, &provider, &hub, &evaluator, &cancel, true).await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(symbol = %symbol, "Poll task cancelled");
                break;
            }
            _ = ticker.tick() => {
                poll_once(&symbol, &provider, &hub, &evaluator, &cancel, false).await;
            }
        }
    }
}

/// One fetch cycle: fetch, publish, evaluate alerts. Failures skip the
/// cycle.
async fn poll_once(
    symbol: &str,
    provider: &Arc<dyn MarketDataProvider>,
    hub: &SharedBroadcastHub,
    evaluator: &Arc<AlertEvaluator>,
    cancel: &CancellationToken,
    initial: bool,
) {
    let started = Instant::now();

    match provider.get_quote(symbol).await {
        Ok(quote) => {
            metrics::record_quote_fetch(FetchResult::Ok);
            metrics::record_fetch_duration(started.elapsed());

            // The task was released while this fetch was in flight; the
            // result is discarded, not published.
            if cancel.is_cancelled() {
                tracing::debug!(symbol, "Symbol deactivated mid-fetch, discarding quote");
                return;
            }

            hub.publish_price(&quote, initial);
            evaluator.evaluate_quote(&quote).await;
        }
        Err(error) => {
            metrics::record_quote_fetch(FetchResult::Error);
            tracing::warn!(symbol, %error, "Quote fetch failed, skipping cycle");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
