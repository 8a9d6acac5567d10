//! Structured logging bootstrap for the wavekeep binaries (§1A).
//!
//! A single `init_tracing()` call, made once at process start, wires
//! `tracing-subscriber` with an `EnvFilter` that honors `RUST_LOG` and falls
//! back to a caller-supplied default. Library crates never call this
//! themselves and never use `println!`; they only emit `info!`/`warn!`/
//! `error!`/`debug!` at component boundaries for whatever subscriber the
//! binary installed.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize human-readable logging.
///
/// Uses `RUST_LOG` if set, otherwise `default_level` (e.g. "info",
/// "wavekeep_agents=debug,warn"). Safe to call more than once — later calls
/// are no-ops, which keeps this usable from test harnesses too.
pub fn init_tracing(service_name: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "tracing initialised (text)");
}

/// Initialize JSON-formatted logging, for log shippers that expect one
/// object per line.
pub fn init_tracing_json(service_name: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "tracing initialised (json)");
}
