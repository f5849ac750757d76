//! Live query subscriptions.
//!
//! A [`Subscription`] is two things glued together:
//!
//! ```text
//!   SnapshotStream  ◀── full ordered result set on every change ── store
//!   ListenerRegistration ── release() / Drop ──▶ store removes the listener
//! ```
//!
//! The halves can be split so a pump task owns the stream while the
//! component that decides *when* to stop owns the registration. Releasing the
//! registration removes the store-side listener immediately; the stream then
//! ends once buffered snapshots are drained. Release runs on every exit path
//! because it is also performed by `Drop`.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::document::Document;
use crate::error::StoreError;

/// One emission: the complete ordered result set, or a terminal error.
pub type SnapshotResult = Result<Vec<Document>, StoreError>;

/// Sending half used by store implementations.
pub type SnapshotSender = mpsc::UnboundedSender<SnapshotResult>;

/// Guard that releases a store-side listener exactly once.
pub struct ListenerRegistration {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A registration with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Remove the listener now.
    pub fn release(mut self) {
        self.run_release();
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Stream half of a subscription.
#[derive(Debug)]
pub struct SnapshotStream {
    rx: mpsc::UnboundedReceiver<SnapshotResult>,
}

impl SnapshotStream {
    pub fn new(rx: mpsc::UnboundedReceiver<SnapshotResult>) -> Self {
        Self { rx }
    }

    /// Next emission; `None` once the listener is gone and the buffer drained.
    pub async fn next_snapshot(&mut self) -> Option<SnapshotResult> {
        self.rx.recv().await
    }
}

impl Stream for SnapshotStream {
    type Item = SnapshotResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// A live, cancellable query subscription.
#[derive(Debug)]
pub struct Subscription {
    stream: SnapshotStream,
    registration: ListenerRegistration,
}

impl Subscription {
    pub fn new(stream: SnapshotStream, registration: ListenerRegistration) -> Self {
        Self {
            stream,
            registration,
        }
    }

    /// Split into the stream and the release guard.
    pub fn into_parts(self) -> (SnapshotStream, ListenerRegistration) {
        (self.stream, self.registration)
    }

    /// Release the listener and drop the stream.
    pub fn cancel(self) {
        self.registration.release();
    }

    pub async fn next_snapshot(&mut self) -> Option<SnapshotResult> {
        self.stream.next_snapshot().await
    }
}

impl Stream for Subscription {
    type Item = SnapshotResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}
