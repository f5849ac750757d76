//! Document store boundary for fyga.
//!
//! The synchronization core consumes a hosted document database as a
//! capability and never sees its transport or persistence engine. This crate
//! defines that capability ([`DocumentStore`]) and ships [`MemoryStore`], an
//! in-process implementation with the same observable semantics: live
//! listeners that re-emit full ordered result sets, optimistic-concurrency
//! transactions with bounded automatic retry, and server-assigned timestamps.
//!
//! # Capability Overview
//!
//! |---------------------|--------------------------------------------------|
//! | Operation           | Semantics                                        |
//! |---------------------|--------------------------------------------------|
//! | `get`               | point read, `None` when absent                    |
//! | `add`               | create with a store-generated id                  |
//! | `set` / `update`    | replace / patch one document                      |
//! | `query`             | one-shot ordered result set                       |
//! | `subscribe`         | live ordered result set + release guard           |
//! | `transaction`       | read N docs, compute writes, commit all or none   |
//! |---------------------|--------------------------------------------------|

pub mod document;
pub mod error;
pub mod memory;
pub mod query;
pub mod subscription;

use async_trait::async_trait;

pub use document::{DocRef, Document, FieldOp, FieldPatch, Fields, to_fields};
pub use error::StoreError;
pub use memory::{DEFAULT_MAX_TRANSACTION_ATTEMPTS, MemoryStore, MemoryStoreConfig};
pub use query::{Direction, Filter, OrderBy, Query};
pub use subscription::{
    ListenerRegistration, SnapshotResult, SnapshotSender, SnapshotStream, Subscription,
};

/// A write produced by a transaction body.
#[derive(Clone, Debug, PartialEq)]
pub struct Write {
    pub doc: DocRef,
    pub op: WriteOp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Create or replace the whole body.
    Set(Fields),
    /// Patch an existing document; the transaction fails if it is absent.
    Update(FieldPatch),
}

impl Write {
    pub fn set(doc: DocRef, fields: Fields) -> Self {
        Self {
            doc,
            op: WriteOp::Set(fields),
        }
    }

    pub fn update(doc: DocRef, patch: FieldPatch) -> Self {
        Self {
            doc,
            op: WriteOp::Update(patch),
        }
    }
}

/// Transaction body: reads (in request order, `None` when absent) → writes.
///
/// May run several times when the store retries after a conflict, so it must
/// be a pure function of its input.
pub type TransactionFn =
    Box<dyn Fn(&[Option<Document>]) -> Result<Vec<Write>, StoreError> + Send + Sync>;

/// The document store capability.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read.
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>, StoreError>;

    /// Create a document with a store-generated id. Returns the id.
    async fn add(&self, collection: &str, patch: FieldPatch) -> Result<String, StoreError>;

    /// Create or replace a document.
    async fn set(&self, doc: &DocRef, fields: Fields) -> Result<(), StoreError>;

    /// Patch an existing document (`NotFound` if absent).
    async fn update(&self, doc: &DocRef, patch: FieldPatch) -> Result<(), StoreError>;

    /// One-shot query.
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Attach a live listener. The first emission is the current result set.
    fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;

    /// Atomic read-then-write over `reads`, retried on write conflict.
    async fn transaction(&self, reads: Vec<DocRef>, body: TransactionFn)
        -> Result<(), StoreError>;
}
