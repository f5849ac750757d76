//! Error types for document store operations.

use thiserror::Error;

/// Errors surfaced by a [`DocumentStore`](crate::DocumentStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A transaction kept losing optimistic-concurrency races.
    #[error("transaction conflict not resolved after {attempts} attempts")]
    ConflictExceeded { attempts: u32 },

    /// Transport-level failure (timeouts, disconnects, injected faults).
    #[error("network error: {0}")]
    Network(String),

    /// The store cannot answer this query (e.g. `IN` over an empty list).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A transaction body refused to produce writes.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// A document body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
