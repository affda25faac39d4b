//! Diagnostic logging setup for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application. `RUST_LOG` takes precedence over the built-in filter.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::constants::{DEFAULT_LOG_FILTER, VERBOSE_LOG_FILTER};

/// The filter used when `RUST_LOG` is unset or invalid.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

/// Install a stderr `fmt` subscriber. Fails if one is already installed.
pub fn init(verbose: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init()
}
