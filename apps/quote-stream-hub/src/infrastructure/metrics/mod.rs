//! Prometheus Metrics Module
//!
//! Exposes hub metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Fetches**: upstream quote fetch counts and latency
//! - **Deliveries**: price updates queued for clients, frames dropped
//! - **Alerts**: trigger transitions
//! - **Gauges**: live connections, active poll tasks
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "stream_hub_quote_fetches_total",
        "Upstream quote fetches by result"
    );
    describe_counter!(
        "stream_hub_price_updates_sent_total",
        "Price update frames queued for client delivery"
    );
    describe_counter!(
        "stream_hub_frames_dropped_total",
        "Frames dropped because a connection's egress queue was full"
    );
    describe_counter!(
        "stream_hub_alerts_triggered_total",
        "Alerts transitioned ACTIVE to TRIGGERED"
    );

    describe_gauge!("stream_hub_connections", "Live WebSocket connections");
    describe_gauge!("stream_hub_poll_tasks", "Active per-symbol poll tasks");

    describe_histogram!(
        "stream_hub_quote_fetch_seconds",
        "Latency of upstream quote fetches"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a quote fetch.
#[derive(Debug, Clone, Copy)]
pub enum FetchResult {
    /// Fetch succeeded.
    Ok,
    /// Fetch failed; the cycle was skipped.
    Error,
}

impl FetchResult {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Record one upstream quote fetch.
pub fn record_quote_fetch(result: FetchResult) {
    counter!(
        "stream_hub_quote_fetches_total",
        "result" => result.as_str()
    )
    .increment(1);
}

/// Record price update frames queued for delivery.
pub fn record_price_updates(count: u64) {
    counter!("stream_hub_price_updates_sent_total").increment(count);
}

/// Record frames dropped due to a full egress queue.
pub fn record_messages_dropped(count: u64) {
    counter!("stream_hub_frames_dropped_total").increment(count);
}

/// Record one alert trigger transition.
pub fn record_alert_triggered() {
    counter!("stream_hub_alerts_triggered_total").increment(1);
}

/// Update the live connection count.
pub fn set_connections(count: f64) {
    gauge!("stream_hub_connections").set(count);
}

/// Update the active poll-task count.
pub fn set_poll_tasks(count: f64) {
    gauge!("stream_hub_poll_tasks").set(count);
}

/// Record the latency of one quote fetch.
pub fn record_fetch_duration(duration: Duration) {
    histogram!("stream_hub_quote_fetch_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_result_as_str() {
        assert_eq!(FetchResult::Ok.as_str(), "ok");
        assert_eq!(FetchResult::Error.as_str(), "error");
    }

    #[test]
    fn handle_absent_before_init() {
        // Recording without an installed recorder is a no-op, not a panic.
        record_quote_fetch(FetchResult::Ok);
        record_price_updates(3);
        set_poll_tasks(1.0);
    }
}
