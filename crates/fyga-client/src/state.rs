//! Observable state container.
//!
//! [`StateCell`] owns a value and publishes every committed version through a
//! `tokio::sync::watch` channel. Updates run under a mutex, so a
//! read-modify-write (for example capture-then-apply in the optimistic
//! engine, or the generation check in a subscription pump) is atomic with
//! respect to every other update.

use parking_lot::Mutex;
use tokio::sync::watch;

pub struct StateCell<S> {
    value: Mutex<S>,
    tx: watch::Sender<S>,
}

impl<S: Clone> StateCell<S> {
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial.clone());
        Self {
            value: Mutex::new(initial),
            tx,
        }
    }

    /// Clone of the current value.
    pub fn get(&self) -> S {
        self.value.lock().clone()
    }

    /// Borrow the current value without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.value.lock())
    }

    /// Mutate in place and publish the result. Returns whatever `f` returns.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut value = self.value.lock();
        let out = f(&mut value);
        self.tx.send_replace(value.clone());
        out
    }

    /// Replace wholesale.
    pub fn replace(&self, next: S) {
        self.update(|value| *value = next);
    }

    /// Observe future versions.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}

impl<S: Clone + Default> Default for StateCell<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}
