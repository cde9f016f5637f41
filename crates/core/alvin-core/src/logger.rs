//! Logging initialization

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global logging system
///
/// Filter resolution order: `RUST_LOG`, then `ALVIN_LOG`, then `info`.
/// Safe to call once at startup; later calls are ignored.
pub fn init_logging() {
    let level = std::env::var("ALVIN_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
