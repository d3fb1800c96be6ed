//! Configuration loaded from environment variables.

mod settings;

pub use settings::{
    ConfigError, HubConfig, LimitSettings, PollSettings, ProviderSettings, Secrets,
    ServerSettings,
};
