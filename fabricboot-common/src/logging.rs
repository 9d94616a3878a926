//! Logging initialization.
//!
//! During first boot the output lands on the serial console, so the plain
//! format is a compact single-line layout. The JSON format is for runs
//! whose captured output gets shipped to log aggregation afterwards.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins over the configured level when set.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Compact single-line logging for the serial console.
pub fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().compact().with_target(true))
        .init();

    Ok(())
}

/// JSON logging for machine-parsed first-boot captures.
pub fn init_logging_json(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().json().with_current_span(false))
        .init();

    Ok(())
}
