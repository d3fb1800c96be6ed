//! Upstream Quote API Client
//!
//! HTTP adapter implementing the [`MarketDataProvider`] port against the
//! dashboard's market-data provider. The provider handles its own caching
//! and rate limiting; this client only fetches, maps payloads, and folds
//! every failure into a transient [`ProviderError`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{MarketDataProvider, ProviderError};
use crate::domain::quote::{Quote, SessionStats};

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the HTTP quote client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the quote API.
    pub base_url: String,
    /// Optional API key sent as `X-Api-Key`.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Create a configuration with the default request timeout.
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            base_url,
            api_key,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// =============================================================================
// Wire Format
// =============================================================================

/// Quote payload as returned by `GET /v1/quotes/{symbol}`.
///
/// ```json
/// {
///   "symbol": "AAPL",
///   "price": "205.31",
///   "change": "2.11",
///   "changePercent": "1.04",
///   "volume": 48123901,
///   "timestamp": "2025-06-02T14:30:00Z",
///   "high": "206.10", "low": "202.55",
///   "open": "203.00", "previousClose": "203.20"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotePayload {
    symbol: String,
    price: Decimal,
    change: Decimal,
    change_percent: Decimal,
    volume: u64,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    high: Option<Decimal>,
    #[serde(default)]
    low: Option<Decimal>,
    #[serde(default)]
    open: Option<Decimal>,
    #[serde(default)]
    previous_close: Option<Decimal>,
}

impl QuotePayload {
    fn into_quote(self) -> Quote {
        let session = match (self.high, self.low, self.open, self.previous_close) {
            (Some(high), Some(low), Some(open), Some(previous_close)) => Some(SessionStats {
                high,
                low,
                open,
                previous_close,
            }),
            _ => None,
        };

        Quote {
            symbol: self.symbol,
            price: self.price,
            change: self.change,
            change_percent: self.change_percent,
            volume: self.volume,
            timestamp: self.timestamp,
            session,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the upstream quote API.
pub struct HttpMarketDataProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpMarketDataProvider {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Unavailable`] when the underlying HTTP
    /// client cannot be constructed.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn quote_url(&self, symbol: &str) -> String {
        format!(
            "{}/v1/quotes/{symbol}",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let mut request = self.client.get(self.quote_url(symbol));
        if let Some(api_key) = &self.config.api_key {
            request = request.header("X-Api-Key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::UnknownSymbol(symbol.to_string()));
        }

        let response = response
            .error_for_status()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let payload: QuotePayload = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(payload.into_quote())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn payload_maps_to_quote_with_session_stats() {
        let payload: QuotePayload = serde_json::from_str(
            r#"{
                "symbol": "AAPL",
                "price": "205.31",
                "change": "2.11",
                "changePercent": "1.04",
                "volume": 48123901,
                "timestamp": "2025-06-02T14:30:00Z",
                "high": "206.10",
                "low": "202.55",
                "open": "203.00",
                "previousClose": "203.20"
            }"#,
        )
        .unwrap();

        let quote = payload.into_quote();

        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.price, Decimal::from_str("205.31").unwrap());
        assert_eq!(quote.volume, 48_123_901);
        let session = quote.session.unwrap();
        assert_eq!(session.previous_close, Decimal::from_str("203.20").unwrap());
    }

    #[test]
    fn payload_without_full_session_stats_maps_to_none() {
        let payload: QuotePayload = serde_json::from_str(
            r#"{
                "symbol": "AAPL",
                "price": 205.31,
                "change": 2.11,
                "changePercent": 1.04,
                "volume": 48123901,
                "timestamp": "2025-06-02T14:30:00Z",
                "high": "206.10"
            }"#,
        )
        .unwrap();

        assert!(payload.into_quote().session.is_none());
    }

    #[test]
    fn quote_url_handles_trailing_slash() {
        let provider = HttpMarketDataProvider::new(ProviderConfig::new(
            "https://quotes.example.com/".to_string(),
            None,
        ))
        .unwrap();

        assert_eq!(
            provider.quote_url("AAPL"),
            "https://quotes.example.com/v1/quotes/AAPL"
        );
    }
}
