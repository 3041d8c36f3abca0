//! Error types for releasability orchestration.

use thiserror::Error;

use crate::bus::BusError;

/// Errors that abort a releasability run or reject its input.
///
/// Per-check failures never show up here: they are recorded as
/// [`CheckResult`](crate::CheckResult) entries in the report.
#[derive(Error, Debug)]
pub enum ReleasabilityError {
    #[error(
        "The provided version {0} does not match the standardized format used commonly \
         across the organization: <MAJOR>.<MINOR>.<PATCH>.<BUILD NUMBER>"
    )]
    InvalidVersion(String),

    #[error("invalid check context: {0}")]
    InvalidContext(String),

    /// A trigger could not be broadcast. Fatal before any polling happens.
    #[error("failed to publish trigger for check {check} ({published} of {total} published): {source}")]
    Publish {
        check: String,
        published: usize,
        total: usize,
        #[source]
        source: BusError,
    },

    /// The inbox could not be read. No report is produced.
    #[error("result listener aborted after {attempts} receive attempt(s): {source}")]
    Listener {
        attempts: u32,
        #[source]
        source: BusError,
    },

    /// An inline check could not reach a verdict. Recorded as `ERROR`.
    #[error("{check} could not be evaluated: {reason}")]
    InlineCheck { check: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for releasability operations.
pub type Result<T> = std::result::Result<T, ReleasabilityError>;
