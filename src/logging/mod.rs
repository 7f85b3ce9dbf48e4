//! Logging configuration and initialization
//!
//! Tracing is installed once per process by [`init_logging`]. Pipeline stages
//! do not write to tracing directly for auditable events; they record into a
//! [`ProcessLog`] handed to them through their stage context, which mirrors
//! every entry to tracing as well.

mod process_log;

pub use process_log::{LogEntry, LogLevel, ProcessLog};

use crate::config::LoggingConfig;
use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process
///
/// An explicit `filter` in the configuration wins, then `RUST_LOG`, then the
/// level derived from verbosity. Installing twice is a no-op.
pub fn init_logging(config: &LoggingConfig) {
    let filter = match &config.filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level())),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.verbosity >= 2) // Show target module for -vv and above
        .with_thread_ids(config.verbosity >= 3)
        .with_line_number(config.verbosity >= 3);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        debug!("Dealflow logging started with verbosity level: {}", config.verbosity);
    } else {
        trace!("Tracing subscriber already installed, keeping it");
    }
}

/// Initialize tracing with just a verbosity level
pub fn init_tracing(verbosity: u8) {
    let config = LoggingConfig {
        verbosity,
        ..LoggingConfig::default()
    };
    init_logging(&config);
}
