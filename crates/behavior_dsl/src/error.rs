//! Error types for behavior DSL parsing.

use thiserror::Error;

/// Errors that can occur while parsing a piece of the behavior DSL.
///
/// Chain parsing itself never fails (malformed entries are reported as
/// warnings and skipped), but the individual value parsers surface these
/// so the warning text can say what was wrong.
#[derive(Debug, Error)]
pub enum Error {
    /// A duration literal could not be parsed.
    #[error("invalid duration '{0}': expected <number><ns|us|ms|s|m|h>")]
    InvalidDuration(String),

    /// A size literal could not be parsed.
    #[error("invalid size '{0}': expected bytes, Ki/Mi/Gi suffix, or percent")]
    InvalidSize(String),

    /// A probability was out of range or malformed.
    #[error("invalid probability '{0}': expected a number in [0, 1]")]
    InvalidProbability(String),

    /// A value did not match the grammar for its key.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// The DSL key whose value was malformed.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Result type alias for behavior DSL operations.
pub type Result<T> = std::result::Result<T, Error>;
