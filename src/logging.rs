//! Logging setup
//!
//! Library code only emits `tracing` events. Hosts (the CLI, or an app
//! embedding the crate) install a subscriber with [`init`].

use crate::config::LoggingConfig;
use crate::error::{InsightError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber
///
/// Writes to stderr so stdout stays free for JSON output. The level comes
/// from `RUST_LOG` when set, otherwise from the config.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| InsightError::Config(format!("failed to initialize logging: {e}")))?;

    tracing::debug!(level = %config.level, "Logging initialized");
    Ok(())
}

/// Initialize logging for tests (captured by the test harness)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
