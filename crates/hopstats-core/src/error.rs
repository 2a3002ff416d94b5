//! Error types for hop statistics aggregation.
//!
//! Bad input records and unsafe error-kind strings are not errors here: they
//! are dropped or sanitized at the ingestion boundary. Only construction and
//! decoding failures surface as [`HopStatsError`].

use thiserror::Error;

/// Main error type for aggregation operations.
#[derive(Error, Debug)]
pub enum HopStatsError {
    // Configuration errors
    #[error("Invalid minimum render interval: {0} ms (must be greater than zero)")]
    InvalidMinInterval(u64),

    // Runtime errors
    #[error("No async runtime available to drive the render scheduler")]
    RuntimeUnavailable,

    // Input errors
    #[error("Invalid probe record: {0}")]
    InvalidRecord(#[source] serde_json::Error),

    #[error("Failed to read input: {0}")]
    Io(#[source] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HopStatsError {
    /// Returns true if the caller can skip the offending input and keep going.
    ///
    /// A bad record on the wire must never stall aggregation, so record
    /// decoding failures are skippable while configuration errors are not.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::InvalidRecord(_))
    }
}

impl From<serde_json::Error> for HopStatsError {
    fn from(err: serde_json::Error) -> Self {
        HopStatsError::InvalidRecord(err)
    }
}

impl From<std::io::Error> for HopStatsError {
    fn from(err: std::io::Error) -> Self {
        HopStatsError::Io(err)
    }
}

/// Result type alias for aggregation operations.
pub type HopStatsResult<T> = Result<T, HopStatsError>;
