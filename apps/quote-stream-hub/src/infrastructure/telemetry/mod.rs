//! Tracing Initialization
//!
//! Structured logging via `tracing` with an env-filter front end.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter directives (default:
//!   `quote_stream_hub=info,hyper=warn`)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVES: &str = "quote_stream_hub=info,hyper=warn,h2=warn";

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops. Export backends
/// (OTLP and friends) would layer in here if the deployment grows one.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
