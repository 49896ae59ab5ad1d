//! Error types for runtime construction.

use thiserror::Error;

/// Errors raised while building the runtime from configuration.
///
/// These are fatal: the process refuses to start on any of them.
#[derive(Debug, Error)]
pub enum Error {
    /// An `UPSTREAMS` record could not be parsed.
    #[error("invalid upstream record '{record}': {reason}")]
    InvalidUpstream {
        /// The offending record text.
        record: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Metric registration failed.
    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Result type alias for runtime construction.
pub type Result<T> = std::result::Result<T, Error>;
