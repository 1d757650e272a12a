//! Domain error types.

use thiserror::Error;

use crate::stream::StreamId;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(StreamId),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on stream {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream that had the conflict.
        stream_id: StreamId,
        /// The version the writer expected.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A command was rejected by the aggregate's state machine.
    #[error("validation error: {0}")]
    Validation(String),

    /// An event payload or aggregate state could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` for errors a caller may resolve by reloading and retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
