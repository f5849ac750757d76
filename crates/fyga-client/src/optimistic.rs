//! Optimistic mutation engine.
//!
//! A mutation updates local state synchronously, then runs its remote effect
//! in a spawned task:
//!
//! ```text
//!   apply() ──▶ lock state ─▶ capture slice ─▶ local edit ─▶ publish ─▶ return handle
//!                                  │
//!   spawned:  remote effect ──ok──▶ (follow-up) ─▶ Committed
//!                          └─err─▶ restore slice ─▶ RolledBack
//! ```
//!
//! Optimistic state is advisory. A later subscription emission overwrites it
//! with the authoritative result set. Rollback restores the captured slice
//! exactly rather than inverting the edit.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use fyga_types::{PostId, UserId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::FeedError;
use crate::state::StateCell;

/// Which part of the view state a mutation edits (and rollback restores).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationScope {
    Posts,
    Profile,
}

/// A user-initiated change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    LikeToggle { post_id: PostId },
    FollowToggle { target: UserId, desired: bool },
    /// Reload-driven: never applied locally.
    CommentAdd { post_id: PostId },
}

impl Mutation {
    pub fn scope(&self) -> MutationScope {
        match self {
            Mutation::LikeToggle { .. } | Mutation::CommentAdd { .. } => MutationScope::Posts,
            Mutation::FollowToggle { .. } => MutationScope::Profile,
        }
    }
}

/// State that supports capture/restore of mutation scopes.
pub trait Optimistic: Clone + Send + Sync + 'static {
    type Snapshot: Send + 'static;

    fn capture(&self, scope: MutationScope) -> Self::Snapshot;

    /// Put a captured slice back verbatim.
    fn restore(&mut self, snapshot: Self::Snapshot);
}

/// Outcome of a mutation's remote effect.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationEvent {
    Committed { mutation: Mutation },
    /// The remote effect failed and the local edit was undone.
    RolledBack { mutation: Mutation, error: FeedError },
    /// A reload-driven mutation failed; there was nothing local to undo.
    Failed { mutation: Mutation, error: FeedError },
}

/// Handle to an in-flight remote effect.
#[derive(Debug)]
pub struct MutationHandle {
    task: JoinHandle<Result<(), FeedError>>,
}

impl MutationHandle {
    /// Wait for the remote effect (and rollback, if any) to finish.
    pub async fn wait(self) -> Result<(), FeedError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(FeedError::MutationFailed(format!("mutation task failed: {e}"))),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[derive(Clone, Debug)]
pub struct OptimisticEngine {
    events: broadcast::Sender<MutationEvent>,
}

impl OptimisticEngine {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.events.subscribe()
    }

    /// Apply `local` now; run `remote` in the background, rolling back on error.
    pub fn apply<S, L, F>(
        &self,
        cell: &Arc<StateCell<S>>,
        mutation: Mutation,
        local: L,
        remote: F,
    ) -> MutationHandle
    where
        S: Optimistic,
        L: FnOnce(&mut S),
        F: Future<Output = Result<(), FeedError>> + Send + 'static,
    {
        self.run(cell, mutation, local, Box::pin(remote), None)
    }

    /// Like [`apply`](Self::apply), then run `reconcile` after a successful
    /// remote effect and before `Committed` is published.
    pub fn apply_then<S, L, F, R>(
        &self,
        cell: &Arc<StateCell<S>>,
        mutation: Mutation,
        local: L,
        remote: F,
        reconcile: R,
    ) -> MutationHandle
    where
        S: Optimistic,
        L: FnOnce(&mut S),
        F: Future<Output = Result<(), FeedError>> + Send + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        self.run(cell, mutation, local, Box::pin(remote), Some(Box::pin(reconcile)))
    }

    /// Run a remote effect with no local edit. Failure publishes `Failed`.
    pub fn spawn_remote<F>(&self, mutation: Mutation, remote: F) -> MutationHandle
    where
        F: Future<Output = Result<(), FeedError>> + Send + 'static,
    {
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            match remote.await {
                Ok(()) => {
                    debug!(?mutation, "remote effect committed");
                    let _ = events.send(MutationEvent::Committed { mutation });
                    Ok(())
                }
                Err(error) => {
                    warn!(?mutation, %error, "remote effect failed");
                    let _ = events.send(MutationEvent::Failed {
                        mutation,
                        error: error.clone(),
                    });
                    Err(error)
                }
            }
        });
        MutationHandle { task }
    }

    fn run<S, L>(
        &self,
        cell: &Arc<StateCell<S>>,
        mutation: Mutation,
        local: L,
        remote: BoxFuture<'static, Result<(), FeedError>>,
        reconcile: Option<BoxFuture<'static, ()>>,
    ) -> MutationHandle
    where
        S: Optimistic,
        L: FnOnce(&mut S),
    {
        let scope = mutation.scope();
        let snapshot = cell.update(|state| {
            let snapshot = state.capture(scope);
            local(state);
            snapshot
        });

        let cell = Arc::clone(cell);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            match remote.await {
                Ok(()) => {
                    if let Some(reconcile) = reconcile {
                        reconcile.await;
                    }
                    debug!(?mutation, "optimistic mutation committed");
                    let _ = events.send(MutationEvent::Committed { mutation });
                    Ok(())
                }
                Err(error) => {
                    warn!(?mutation, %error, "remote effect failed, rolling back");
                    cell.update(|state| state.restore(snapshot));
                    let _ = events.send(MutationEvent::RolledBack {
                        mutation,
                        error: error.clone(),
                    });
                    Err(error)
                }
            }
        });
        MutationHandle { task }
    }
}
