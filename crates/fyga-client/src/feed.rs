//! Feed subscriptions.
//!
//! Two layers:
//!
//! - [`open_feed`] is the raw contract: a [`FeedStream`] of
//!   [`FeedSnapshot`]s for one tab, backed by one store listener.
//! - [`FeedSubscriptionManager`] keeps exactly one such stream alive per
//!   view, pumping snapshots into a [`StateCell<FeedViewState>`].
//!
//! # Activation
//!
//! ```text
//!   activate(tab, following)
//!     1. release previous listener (synchronous) + abort its pump
//!     2. generation += 1, posts = [], status = Loading
//!     3. Followed with no followees  → empty snapshot, status = Ready, no query
//!        otherwise                   → subscribe + spawn pump(generation)
//!
//!   pump: for each emission
//!     generation still current? → posts = snapshot (wholesale), status = Ready
//!     store error               → status = Failed(msg), stop
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use fyga_store::{
    Direction, Document, DocumentStore, ListenerRegistration, Query, SnapshotStream, StoreError,
};
use fyga_types::{FeedTab, IdSet, Post, PostId, UserId};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::constants::{POSTS, fields};
use crate::error::FeedError;
use crate::state::StateCell;
use crate::view::{FeedStatus, FeedViewState};

// ============================================================================
// Snapshots and decoding
// ============================================================================

/// One emission of a feed: the complete ordered post list.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedSnapshot {
    pub tab: FeedTab,
    pub posts: Vec<Post>,
}

/// Decode post documents, skipping any that fail schema validation.
pub fn decode_posts(docs: Vec<Document>) -> Vec<Post> {
    docs.into_iter()
        .filter_map(|doc| match doc.decode::<Post>() {
            Ok(mut post) => {
                post.id = PostId::new(doc.id);
                Some(post)
            }
            Err(e) => {
                warn!(post_id = %doc.id, error = %e, "skipping malformed post document");
                None
            }
        })
        .collect()
}

/// Query for a tab, or `None` when the feed is trivially empty (Followed
/// with nobody followed).
pub fn feed_query(tab: FeedTab, following: Option<&IdSet<UserId>>) -> Option<Query> {
    let query = Query::collection(POSTS).order_by(fields::TIMESTAMP, Direction::Descending);
    match tab {
        FeedTab::Global => Some(query),
        FeedTab::Followed => {
            let following = following.filter(|f| !f.is_empty())?;
            Some(query.where_in(
                fields::USER_ID,
                following.iter().map(|u| u.as_str().to_owned()),
            ))
        }
    }
}

/// One-shot: every post by `user`, newest first.
pub async fn load_user_posts(
    store: &dyn DocumentStore,
    user: &UserId,
) -> Result<Vec<Post>, FeedError> {
    let query = Query::collection(POSTS)
        .where_eq(fields::USER_ID, user.as_str())
        .order_by(fields::TIMESTAMP, Direction::Descending);
    Ok(decode_posts(store.query(&query).await?))
}

// ============================================================================
// FeedStream
// ============================================================================

enum StreamState {
    /// Yields one empty snapshot, then ends.
    Empty { pending: bool },
    Live {
        snapshots: SnapshotStream,
        registration: Option<ListenerRegistration>,
    },
}

/// Stream of feed snapshots. Terminal errors end the stream.
pub struct FeedStream {
    tab: FeedTab,
    state: StreamState,
}

impl FeedStream {
    fn empty(tab: FeedTab) -> Self {
        Self {
            tab,
            state: StreamState::Empty { pending: true },
        }
    }

    pub fn tab(&self) -> FeedTab {
        self.tab
    }

    /// Whether this stream is backed by a store listener.
    pub fn is_live(&self) -> bool {
        matches!(self.state, StreamState::Live { .. })
    }

    /// Take the listener guard so another owner controls release. Releasing
    /// it ends this stream once buffered snapshots are drained.
    pub fn detach_registration(&mut self) -> ListenerRegistration {
        match &mut self.state {
            StreamState::Live { registration, .. } => {
                registration.take().unwrap_or_else(ListenerRegistration::noop)
            }
            StreamState::Empty { .. } => ListenerRegistration::noop(),
        }
    }
}

impl Stream for FeedStream {
    type Item = Result<FeedSnapshot, FeedError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let tab = this.tab;
        match &mut this.state {
            StreamState::Empty { pending } => {
                if std::mem::take(pending) {
                    Poll::Ready(Some(Ok(FeedSnapshot {
                        tab,
                        posts: Vec::new(),
                    })))
                } else {
                    Poll::Ready(None)
                }
            }
            StreamState::Live { snapshots, .. } => {
                Pin::new(snapshots).poll_next(cx).map(|item| {
                    item.map(|result| match result {
                        Ok(docs) => Ok(FeedSnapshot {
                            tab,
                            posts: decode_posts(docs),
                        }),
                        Err(e) => Err(FeedError::Subscription(e.to_string())),
                    })
                })
            }
        }
    }
}

/// Open a live feed for `tab`.
///
/// `Followed` with an empty (or unknown) following set yields a single empty
/// snapshot without touching the store.
pub fn open_feed(
    store: &dyn DocumentStore,
    tab: FeedTab,
    following: Option<&IdSet<UserId>>,
) -> Result<FeedStream, FeedError> {
    let Some(query) = feed_query(tab, following) else {
        debug!(%tab, "no followees; synthesizing empty feed");
        return Ok(FeedStream::empty(tab));
    };
    let (snapshots, registration) = store
        .subscribe(query)
        .map_err(|e: StoreError| FeedError::Subscription(e.to_string()))?
        .into_parts();
    Ok(FeedStream {
        tab,
        state: StreamState::Live {
            snapshots,
            registration: Some(registration),
        },
    })
}

// ============================================================================
// FeedSubscriptionManager
// ============================================================================

struct ActiveFeed {
    registration: ListenerRegistration,
    pump: JoinHandle<()>,
}

#[derive(Default)]
struct ManagerState {
    active: Option<ActiveFeed>,
    /// Last activation request, replayed by `retry()`.
    last: Option<(FeedTab, Option<IdSet<UserId>>)>,
}

/// Keeps at most one live feed subscription for a view.
pub struct FeedSubscriptionManager {
    store: Arc<dyn DocumentStore>,
    state: Arc<StateCell<FeedViewState>>,
    inner: Mutex<ManagerState>,
}

impl FeedSubscriptionManager {
    pub fn new(store: Arc<dyn DocumentStore>, state: Arc<StateCell<FeedViewState>>) -> Self {
        Self {
            store,
            state,
            inner: Mutex::new(ManagerState::default()),
        }
    }

    /// Replace the active subscription with one for `tab`. Returns the new
    /// generation. Must be called from within a tokio runtime.
    pub fn activate(&self, tab: FeedTab, following: Option<&IdSet<UserId>>) -> u64 {
        let mut inner = self.inner.lock();
        stop(inner.active.take());
        inner.last = Some((tab, following.cloned()));

        // The previous tab's posts go with it; nothing renders them under `tab`.
        let generation = self.state.update(|s| {
            s.generation += 1;
            s.tab = tab;
            s.posts.clear();
            s.status = FeedStatus::Loading;
            s.error_message = None;
            s.generation
        });

        let mut stream = match open_feed(self.store.as_ref(), tab, following) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%tab, generation, error = %err, "feed subscription rejected");
                fail(&self.state, generation, &err);
                return generation;
            }
        };

        if !stream.is_live() {
            // Trivially empty: apply synchronously, nothing to pump.
            self.state.update(|s| s.status = FeedStatus::Ready);
            return generation;
        }

        info!(%tab, generation, "feed activated");
        let registration = stream.detach_registration();
        let pump = tokio::spawn(pump(Arc::clone(&self.state), stream, generation));
        inner.active = Some(ActiveFeed { registration, pump });
        generation
    }

    /// Re-activate with the last request (after `Failed`).
    pub fn retry(&self) -> Option<u64> {
        let last = self.inner.lock().last.clone();
        last.map(|(tab, following)| self.activate(tab, following.as_ref()))
    }

    /// Drop the live subscription (e.g. navigating away).
    pub fn deactivate(&self) {
        let mut inner = self.inner.lock();
        stop(inner.active.take());
        self.state.update(|s| {
            s.generation += 1;
            s.status = FeedStatus::Idle;
        });
        debug!("feed deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active.is_some()
    }
}

impl Drop for FeedSubscriptionManager {
    fn drop(&mut self) {
        stop(self.inner.get_mut().active.take());
    }
}

fn stop(active: Option<ActiveFeed>) {
    if let Some(active) = active {
        active.registration.release();
        active.pump.abort();
    }
}

fn fail(state: &StateCell<FeedViewState>, generation: u64, err: &FeedError) {
    state.update(|s| {
        if s.generation == generation {
            s.status = FeedStatus::Failed(err.to_string());
            s.error_message = Some(err.to_string());
        }
    });
}

async fn pump(state: Arc<StateCell<FeedViewState>>, mut stream: FeedStream, generation: u64) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(snapshot) => {
                let count = snapshot.posts.len();
                let current = state.update(|s| {
                    if s.generation != generation {
                        return false;
                    }
                    s.posts = snapshot.posts;
                    s.status = FeedStatus::Ready;
                    s.error_message = None;
                    true
                });
                if !current {
                    debug!(generation, "dropping emission from superseded feed");
                    return;
                }
                trace!(generation, count, "feed snapshot applied");
            }
            Err(err) => {
                warn!(generation, error = %err, "feed subscription failed");
                fail(&state, generation, &err);
                return;
            }
        }
    }
    trace!(generation, "feed stream ended");
}
