//! # Error Types
//!
//! Errors raised by the foundational types. All use `thiserror` for
//! derive-based `Display` and `Error` implementations.

use thiserror::Error;

/// Top-level error type for `crms-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A timestamp string could not be parsed or is out of range.
    #[error("invalid timestamp {input:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        input: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// An identifier string is not a valid UUID or key component.
    #[error("invalid identifier {input:?}: {reason}")]
    InvalidIdentifier {
        /// The rejected input.
        input: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
