//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Pick the log level from the resolved `verbose` setting
//!
//! # Design Decisions
//! - `RUST_LOG` always wins over the built-in filter
//! - Set up after config resolution, since the config file can turn on
//!   verbose output

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for a verbosity level.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "vproxy=debug,tower_http=debug"
    } else {
        "vproxy=info"
    }
}

/// Install the global subscriber.
pub fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
