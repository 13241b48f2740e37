//! Tracing subscriber setup.

use shelfdb_common::{Result, ShelfError};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// `RUST_LOG` when set, the configured level otherwise.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    let fallback = || EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback())
    } else {
        fallback()
    }
}

/// Install a global formatting subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(config.ansi)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ShelfError::Config(format!("failed to install log subscriber: {e}")))
}
