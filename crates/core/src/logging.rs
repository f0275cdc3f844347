//! Logging setup helper for binaries embedding devmux

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a tracing subscriber honoring `RUST_LOG`, falling back to the
/// given default filter. Call once, early, from the embedding application.
pub fn setup_logging(default_level: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| format!("invalid log filter: {e}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    Ok(())
}
