//! SEP CLI Library
//!
//! Shared functionality for the SEP command-line tools.

pub mod config;
pub mod stats;

pub use config::{ConfigError, PeerConfig, PeerSettings};
pub use stats::{display_compact_stats, display_endpoint_stats, format_bytes, format_rtt};

/// Install the tracing subscriber used by every tool
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when verbose.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
