//! Error taxonomy for the synchronization core.

use fyga_store::StoreError;
use thiserror::Error;

/// Errors surfaced by feeds, mutations and graph transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The live subscription failed; terminal for that subscription.
    #[error("subscription failed: {0}")]
    Subscription(String),
    /// A remote write failed after the local view was updated.
    #[error("mutation failed: {0}")]
    MutationFailed(String),
    /// The store gave up retrying a contended transaction.
    #[error("transaction conflicted {attempts} times; giving up")]
    TransactionConflictExceeded { attempts: u32 },
    /// No signed-in user.
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("not found: {0}")]
    NotFound(String),
    /// Input rejected before reaching the store.
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for FeedError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConflictExceeded { attempts } => {
                FeedError::TransactionConflictExceeded { attempts }
            }
            StoreError::NotFound(what) => FeedError::NotFound(what),
            other => FeedError::Store(other),
        }
    }
}
