//! Tracing initialization.
//!
//! Logs go to stderr so that CLI output on stdout (answers, JSON, tables)
//! stays pipeable. The level is taken from `RUST_LOG` and defaults to `info`.
//!
//! ```bash
//! RUST_LOG=debug rbi serve
//! RUST_LOG=rainbow_intel=trace,tower_http=debug rbi serve
//! ```

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Fails if one is already installed.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    Ok(())
}
