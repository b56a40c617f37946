//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A source event arrived without its header.
    #[error("Event {index} of transaction [{transaction_hash}] has no header")]
    MissingHeader {
        /// Position of the event within its transaction.
        index: usize,
        /// Hash of the owning transaction.
        transaction_hash: String,
    },

    /// Event could not be encoded for publishing.
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
