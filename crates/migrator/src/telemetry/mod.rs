//! Logging for `fieldcrypt-migrate`.
//!
//! The migrator's stdout carries exactly one document: the JSON
//! [`MigrationReport`](common::MigrationReport), so it can be piped straight
//! into `jq` or captured by a deploy script. Every log event therefore goes to
//! stderr, one JSON object per line.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the stderr JSON subscriber.
///
/// The filter comes from `RUST_LOG` when it is set and parses; otherwise
/// `log_level` (from `FIELDCRYPT_LOG_LEVEL`) is used as the filter directive.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install migrator log subscriber: {e}"))
}
