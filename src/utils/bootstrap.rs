//! Startup helpers shared across the service binaries.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LOG_ENV_VAR;

/// Initialize tracing from the `ORDERFLOW_LOG` env filter (default "info").
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Configuration file path from the first CLI argument, if given.
pub fn parse_config_path() -> Option<String> {
    std::env::args().nth(1)
}
