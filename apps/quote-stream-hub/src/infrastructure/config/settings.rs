//! Hub Configuration Settings
//!
//! Configuration types for the stream hub, loaded from environment
//! variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_DATA_BASE_URL`: Base URL of the upstream quote API
//!
//! ## Optional
//! - `MARKET_DATA_API_KEY`: API key for the quote API
//! - `STREAM_HUB_TOKEN_SECRET`: Shared secret for bearer tokens; unset
//!   means every session is anonymous
//! - `STREAM_HUB_WS_PORT`: WebSocket port (default: 8080)
//! - `STREAM_HUB_HEALTH_PORT`: Health/metrics HTTP port (default: 8081)
//! - `QUOTE_POLL_INTERVAL_SECS`: Per-symbol fetch interval (default: 30)
//! - `PROVIDER_TIMEOUT_SECS`: Upstream request timeout (default: 10)
//! - `MAX_SYMBOLS_PER_CONNECTION`: Subscription cap (default: 20)
//! - `EGRESS_QUEUE_CAPACITY`: Per-connection outbound buffer (default: 256)

use std::time::Duration;

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// WebSocket port.
    pub ws_port: u16,
    /// Health/metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 8080,
            health_port: 8081,
        }
    }
}

/// Quote polling settings.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Fixed fetch interval per active symbol.
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Per-connection limits.
#[derive(Debug, Clone)]
pub struct LimitSettings {
    /// Maximum distinct symbols one connection may hold.
    pub max_symbols_per_connection: usize,
    /// Capacity of each connection's egress queue.
    pub egress_capacity: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_symbols_per_connection: 20,
            egress_capacity: 256,
        }
    }
}

/// Upstream provider settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Base URL of the quote API.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Secrets held by the hub. Debug output is redacted.
#[derive(Clone, Default)]
pub struct Secrets {
    market_data_api_key: Option<String>,
    token_secret: Option<String>,
}

impl Secrets {
    /// Create secrets from raw values.
    #[must_use]
    pub const fn new(market_data_api_key: Option<String>, token_secret: Option<String>) -> Self {
        Self {
            market_data_api_key,
            token_secret,
        }
    }

    /// API key for the quote API, if configured.
    #[must_use]
    pub fn market_data_api_key(&self) -> Option<&str> {
        self.market_data_api_key.as_deref()
    }

    /// Shared bearer-token secret, if configured.
    #[must_use]
    pub fn token_secret(&self) -> Option<&str> {
        self.token_secret.as_deref()
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field(
                "market_data_api_key",
                &self.market_data_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "token_secret",
                &self.token_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Quote polling settings.
    pub poll: PollSettings,
    /// Per-connection limits.
    pub limits: LimitSettings,
    /// Upstream provider settings.
    pub provider: ProviderSettings,
    /// Secrets.
    pub secrets: Secrets,
}

impl HubConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("MARKET_DATA_BASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("MARKET_DATA_BASE_URL".to_string()))?;
        if base_url.is_empty() {
            return Err(ConfigError::EmptyValue("MARKET_DATA_BASE_URL".to_string()));
        }

        let market_data_api_key = std::env::var("MARKET_DATA_API_KEY").ok().filter(|v| !v.is_empty());
        let token_secret = std::env::var("STREAM_HUB_TOKEN_SECRET").ok().filter(|v| !v.is_empty());

        let server = ServerSettings {
            ws_port: parse_env_u16("STREAM_HUB_WS_PORT", ServerSettings::default().ws_port),
            health_port: parse_env_u16(
                "STREAM_HUB_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let poll = PollSettings {
            interval: parse_env_duration_secs(
                "QUOTE_POLL_INTERVAL_SECS",
                PollSettings::default().interval,
            ),
        };

        let limits = LimitSettings {
            max_symbols_per_connection: parse_env_usize(
                "MAX_SYMBOLS_PER_CONNECTION",
                LimitSettings::default().max_symbols_per_connection,
            ),
            egress_capacity: parse_env_usize(
                "EGRESS_QUEUE_CAPACITY",
                LimitSettings::default().egress_capacity,
            ),
        };

        let provider = ProviderSettings {
            base_url,
            request_timeout: parse_env_duration_secs(
                "PROVIDER_TIMEOUT_SECS",
                Duration::from_secs(10),
            ),
        };

        Ok(Self {
            server,
            poll,
            limits,
            provider,
            secrets: Secrets::new(market_data_api_key, token_secret),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.ws_port, 8080);
        assert_eq!(settings.health_port, 8081);
    }

    #[test]
    fn poll_settings_default_interval() {
        assert_eq!(PollSettings::default().interval, Duration::from_secs(30));
    }

    #[test]
    fn limit_settings_defaults() {
        let settings = LimitSettings::default();
        assert_eq!(settings.max_symbols_per_connection, 20);
        assert_eq!(settings.egress_capacity, 256);
    }

    #[test]
    fn secrets_redacted_debug() {
        let secrets = Secrets::new(Some("key123".to_string()), Some("secret456".to_string()));
        let debug = format!("{secrets:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn secrets_accessors() {
        let secrets = Secrets::new(None, Some("s".to_string()));
        assert_eq!(secrets.market_data_api_key(), None);
        assert_eq!(secrets.token_secret(), Some("s"));
    }
}
