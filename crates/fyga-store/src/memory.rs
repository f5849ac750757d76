//! In-process document store.
//!
//! Implements [`DocumentStore`] with the observable semantics of a hosted
//! document database, so the synchronization core can run (and be tested)
//! without a network.
//!
//! # Concurrency Model
//!
//! - One `RwLock` over all collections; a commit holds the write lock, then
//!   downgrades to a read lock to fan out snapshots, so listeners see commits
//!   in commit order.
//! - DashMap for the listener registry.
//! - Every document carries a version. A transaction records the versions of
//!   its reads, yields (the commit is a separate round trip), and commits only
//!   if none of them moved; otherwise it re-runs its body against fresh reads.
//!
//! # Fault Injection
//!
//! `fail_next_*` and `force_conflicts` make the next N operations fail, which
//! is how rollback and retry paths are exercised.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::document::{DocRef, Document, FieldPatch, Fields};
use crate::error::StoreError;
use crate::query::Query;
use crate::subscription::{ListenerRegistration, SnapshotSender, SnapshotStream, Subscription};
use crate::{DocumentStore, TransactionFn, Write, WriteOp};

/// Attempts before a conflicting transaction gives up.
pub const DEFAULT_MAX_TRANSACTION_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug)]
pub struct MemoryStoreConfig {
    /// Upper bound on transaction attempts (including the first).
    pub max_transaction_attempts: u32,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_transaction_attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS,
        }
    }
}

struct Versioned {
    fields: Fields,
    version: u64,
}

type Collections = HashMap<String, BTreeMap<String, Versioned>>;

struct Listener {
    query: Query,
    tx: SnapshotSender,
}

/// Pending injected failures, each counting down to zero.
#[derive(Default)]
struct Faults {
    reads: u32,
    writes: u32,
    transactions: u32,
    subscribes: u32,
    conflicts: u32,
}

struct Inner {
    config: MemoryStoreConfig,
    docs: RwLock<Collections>,
    listeners: DashMap<u64, Listener>,
    next_listener_id: AtomicU64,
    subscribe_calls: AtomicU64,
    /// Last server timestamp handed out (monotonic).
    clock: AtomicU64,
    faults: Mutex<Faults>,
}

/// Thread-safe, cheaply clonable in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                docs: RwLock::new(HashMap::new()),
                listeners: DashMap::new(),
                next_listener_id: AtomicU64::new(1),
                subscribe_calls: AtomicU64::new(0),
                clock: AtomicU64::new(0),
                faults: Mutex::new(Faults::default()),
            }),
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Number of `subscribe` calls ever made (successful or not).
    pub fn subscribe_count(&self) -> u64 {
        self.inner.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Current version of a document (0 when absent).
    pub fn version(&self, doc: &DocRef) -> u64 {
        version_of(&self.inner.docs.read(), doc)
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Fail the next `n` point reads / queries with a network error.
    pub fn fail_next_reads(&self, n: u32) {
        self.inner.faults.lock().reads = n;
    }

    /// Fail the next `n` non-transactional writes (`add`, `set`, `update`).
    pub fn fail_next_writes(&self, n: u32) {
        self.inner.faults.lock().writes = n;
    }

    /// Fail the next `n` transactions outright (no retry).
    pub fn fail_next_transactions(&self, n: u32) {
        self.inner.faults.lock().transactions = n;
    }

    /// Reject the next `n` `subscribe` calls.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.inner.faults.lock().subscribes = n;
    }

    /// Make the next `n` transaction commit attempts lose a conflict.
    pub fn force_conflicts(&self, n: u32) {
        self.inner.faults.lock().conflicts = n;
    }

    /// Terminate every listener on `collection` with a network error.
    pub fn break_listeners(&self, collection: &str, message: &str) {
        let ids: Vec<u64> = self
            .inner
            .listeners
            .iter()
            .filter(|l| l.query.collection == collection)
            .map(|l| *l.key())
            .collect();
        for id in ids {
            if let Some((_, listener)) = self.inner.listeners.remove(&id) {
                warn!(listener = id, %collection, "breaking listener: {message}");
                let _ = listener.tx.send(Err(StoreError::Network(message.to_string())));
            }
        }
    }

    fn take_fault(&self, pick: impl FnOnce(&mut Faults) -> &mut u32) -> bool {
        let mut faults = self.inner.faults.lock();
        let slot = pick(&mut faults);
        if *slot > 0 {
            *slot -= 1;
            true
        } else {
            false
        }
    }

    /// Server clock: wall time, forced strictly increasing.
    fn now(&self) -> u64 {
        let wall = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut last = self.inner.clock.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self
                .inner
                .clock
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    // ========================================================================
    // Commit + fan-out
    // ========================================================================

    /// Validate and apply `writes` all-or-nothing, then notify listeners.
    fn commit(
        &self,
        mut docs: RwLockWriteGuard<'_, Collections>,
        writes: &[Write],
    ) -> Result<(), StoreError> {
        // Updates must target documents that exist (or are created earlier
        // in the same batch).
        let mut created: HashSet<&DocRef> = HashSet::new();
        for w in writes {
            match &w.op {
                WriteOp::Set(_) => {
                    created.insert(&w.doc);
                }
                WriteOp::Update(_) => {
                    if version_of(&docs, &w.doc) == 0 && !created.contains(&w.doc) {
                        return Err(StoreError::NotFound(w.doc.to_string()));
                    }
                }
            }
        }

        let now = self.now();
        let mut touched = HashSet::new();
        for w in writes {
            let coll = docs.entry(w.doc.collection.clone()).or_default();
            match &w.op {
                WriteOp::Set(fields) => {
                    let version = coll.get(&w.doc.id).map_or(0, |v| v.version) + 1;
                    coll.insert(
                        w.doc.id.clone(),
                        Versioned {
                            fields: fields.clone(),
                            version,
                        },
                    );
                }
                WriteOp::Update(patch) => {
                    if let Some(entry) = coll.get_mut(&w.doc.id) {
                        patch.apply(&mut entry.fields, now);
                        entry.version += 1;
                    }
                }
            }
            trace!(doc = %w.doc, "committed write");
            touched.insert(w.doc.collection.clone());
        }

        let docs = RwLockWriteGuard::downgrade(docs);
        self.notify(&docs, &touched);
        Ok(())
    }

    fn notify(&self, docs: &Collections, touched: &HashSet<String>) {
        let mut dead = Vec::new();
        for listener in self.inner.listeners.iter() {
            if !touched.contains(&listener.query.collection) {
                continue;
            }
            let snapshot = run_query(docs, &listener.query);
            if listener.tx.send(Ok(snapshot)).is_err() {
                dead.push(*listener.key());
            }
        }
        for id in dead {
            debug!(listener = id, "dropping listener with closed receiver");
            self.inner.listeners.remove(&id);
        }
    }
}

fn version_of(docs: &Collections, doc: &DocRef) -> u64 {
    docs.get(&doc.collection)
        .and_then(|c| c.get(&doc.id))
        .map_or(0, |v| v.version)
}

fn read_doc(docs: &Collections, doc: &DocRef) -> Option<Document> {
    docs.get(&doc.collection)
        .and_then(|c| c.get(&doc.id))
        .map(|v| Document::new(doc.id.clone(), v.fields.clone()))
}

fn run_query(docs: &Collections, query: &Query) -> Vec<Document> {
    let mut out: Vec<Document> = docs
        .get(&query.collection)
        .map(|coll| {
            coll.iter()
                .filter(|(_, v)| query.matches(&v.fields))
                .map(|(id, v)| Document::new(id.clone(), v.fields.clone()))
                .collect()
        })
        .unwrap_or_default();
    query.sort(&mut out);
    out
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>, StoreError> {
        if self.take_fault(|f| &mut f.reads) {
            return Err(StoreError::Network(format!("injected read failure on {doc}")));
        }
        Ok(read_doc(&self.inner.docs.read(), doc))
    }

    async fn add(&self, collection: &str, patch: FieldPatch) -> Result<String, StoreError> {
        if self.take_fault(|f| &mut f.writes) {
            return Err(StoreError::Network(format!("injected write failure on {collection}")));
        }
        let id = uuid::Uuid::now_v7().as_simple().to_string();
        let mut fields = Fields::new();
        patch.apply(&mut fields, self.now());
        let doc = DocRef::new(collection, id.clone());
        debug!(%doc, "adding document");
        self.commit(self.inner.docs.write(), &[Write::set(doc, fields)])?;
        Ok(id)
    }

    async fn set(&self, doc: &DocRef, fields: Fields) -> Result<(), StoreError> {
        if self.take_fault(|f| &mut f.writes) {
            return Err(StoreError::Network(format!("injected write failure on {doc}")));
        }
        self.commit(self.inner.docs.write(), &[Write::set(doc.clone(), fields)])
    }

    async fn update(&self, doc: &DocRef, patch: FieldPatch) -> Result<(), StoreError> {
        if self.take_fault(|f| &mut f.writes) {
            return Err(StoreError::Network(format!("injected write failure on {doc}")));
        }
        self.commit(self.inner.docs.write(), &[Write::update(doc.clone(), patch)])
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        if self.take_fault(|f| &mut f.reads) {
            return Err(StoreError::Network(format!(
                "injected read failure on {}",
                query.collection
            )));
        }
        query.validate()?;
        Ok(run_query(&self.inner.docs.read(), query))
    }

    fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        self.inner.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_fault(|f| &mut f.subscribes) {
            return Err(StoreError::Network(format!(
                "injected subscribe failure on {}",
                query.collection
            )));
        }
        query.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        {
            // Initial snapshot and registration under one read lock so no
            // commit slips in between.
            let docs = self.inner.docs.read();
            let _ = tx.send(Ok(run_query(&docs, &query)));
            debug!(listener = id, collection = %query.collection, "listener attached");
            self.inner.listeners.insert(id, Listener { query, tx });
        }

        let weak = Arc::downgrade(&self.inner);
        let registration = ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                if inner.listeners.remove(&id).is_some() {
                    debug!(listener = id, "listener released");
                }
            }
        });
        Ok(Subscription::new(SnapshotStream::new(rx), registration))
    }

    async fn transaction(
        &self,
        reads: Vec<DocRef>,
        body: TransactionFn,
    ) -> Result<(), StoreError> {
        let max_attempts = self.inner.config.max_transaction_attempts.max(1);
        for attempt in 1..=max_attempts {
            if self.take_fault(|f| &mut f.transactions) {
                return Err(StoreError::Network("injected transaction failure".into()));
            }

            let (snapshot, versions): (Vec<Option<Document>>, Vec<u64>) = {
                let docs = self.inner.docs.read();
                reads
                    .iter()
                    .map(|r| (read_doc(&docs, r), version_of(&docs, r)))
                    .unzip()
            };
            let writes = body(&snapshot)?;

            // The commit is a separate round trip.
            tokio::task::yield_now().await;

            let forced = self.take_fault(|f| &mut f.conflicts);
            let docs = self.inner.docs.write();
            let moved = reads
                .iter()
                .zip(&versions)
                .any(|(r, seen)| version_of(&docs, r) != *seen);
            if forced || moved {
                drop(docs);
                debug!(attempt, max_attempts, "transaction conflict, retrying");
                continue;
            }
            return self.commit(docs, &writes);
        }
        warn!(max_attempts, "transaction gave up after repeated conflicts");
        Err(StoreError::ConflictExceeded {
            attempts: max_attempts,
        })
    }
}
