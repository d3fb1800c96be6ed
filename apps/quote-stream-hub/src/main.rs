//! Quote Stream Hub Binary
//!
//! Starts the real-time quote distribution and alert engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-stream-hub
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_DATA_BASE_URL`: Base URL of the upstream quote API
//!
//! ## Optional
//! - `MARKET_DATA_API_KEY`: API key for the quote API
//! - `STREAM_HUB_TOKEN_SECRET`: Bearer-token secret (unset = anonymous only)
//! - `STREAM_HUB_WS_PORT`: WebSocket port (default: 8080)
//! - `STREAM_HUB_HEALTH_PORT`: Health/metrics HTTP port (default: 8081)
//! - `QUOTE_POLL_INTERVAL_SECS`: Per-symbol fetch interval (default: 30)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use quote_stream_hub::infrastructure::provider::ProviderConfig;
use quote_stream_hub::infrastructure::ws::session::ConnectionManager;
use quote_stream_hub::{
    AlertEvaluator, AlertPublisher, AlertStore, BroadcastHub, HealthServer, HealthServerState,
    HmacTokenVerifier, HttpMarketDataProvider, HubConfig, IdentityVerifier, InMemoryAlertStore,
    MarketDataProvider, QuotePoller, QuotePollerConfig, SubscriptionRegistry, WsServer,
    init_metrics, init_telemetry,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_telemetry();

    tracing::info!("Starting Quote Stream Hub");

    let _metrics_handle = init_metrics();

    let config = HubConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Core wiring: registry → hub → evaluator → poller → sessions.
    let registry = Arc::new(SubscriptionRegistry::with_symbol_cap(
        config.limits.max_symbols_per_connection,
    ));
    let hub = Arc::new(BroadcastHub::new(Arc::clone(&registry)));

    let provider_config = ProviderConfig {
        base_url: config.provider.base_url.clone(),
        api_key: config
            .secrets
            .market_data_api_key()
            .map(ToString::to_string),
        request_timeout: config.provider.request_timeout,
    };
    let provider: Arc<dyn MarketDataProvider> =
        Arc::new(HttpMarketDataProvider::new(provider_config)?);

    let store: Arc<dyn AlertStore> = Arc::new(InMemoryAlertStore::new());
    let evaluator = Arc::new(AlertEvaluator::new(
        Arc::clone(&store),
        Arc::clone(&provider),
        Arc::clone(&hub) as Arc<dyn AlertPublisher>,
    ));

    let poller = Arc::new(QuotePoller::new(
        QuotePollerConfig {
            interval: config.poll.interval,
        },
        Arc::clone(&provider),
        Arc::clone(&hub),
        Arc::clone(&evaluator),
    ));

    let verifier: Arc<dyn IdentityVerifier> = Arc::new(HmacTokenVerifier::new(
        config.secrets.token_secret().map(ToString::to_string),
    ));

    let manager = Arc::new(ConnectionManager::new(
        Arc::clone(&registry),
        Arc::clone(&hub),
        Arc::clone(&poller),
        verifier,
        config.limits.egress_capacity,
    ));

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&registry),
        Arc::clone(&hub),
        Arc::clone(&poller),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // WebSocket server
    let ws_server = WsServer::new(config.server.ws_port, manager, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = ws_server.run().await {
            tracing::error!(error = %e, "WebSocket server error");
        }
    });

    tracing::info!("Stream hub ready");

    await_shutdown(shutdown_token).await;
    poller.shutdown();

    tracing::info!("Stream hub stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &HubConfig) {
    tracing::info!(
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        poll_interval_secs = config.poll.interval.as_secs(),
        symbol_cap = config.limits.max_symbols_per_connection,
        provider_url = %config.provider.base_url,
        auth_enabled = config.secrets.token_secret().is_some(),
        "Configuration loaded"
    );
}

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
