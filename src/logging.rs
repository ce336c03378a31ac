//! Tracing setup for the console.

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_FILTER_VAR: &str = "STOWAGE_LOG";
const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Calling it a second time is a no-op.
pub fn init() {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = Registry::default()
        .with(env_filter())
        .with(console_layer)
        .try_init();

    if installed.is_ok() {
        tracing::debug!("🪵 Logging initialized");
    }
}
