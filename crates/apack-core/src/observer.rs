//! # Observer Registry
//!
//! Explicit subscribe/unsubscribe capability used by references, the
//! fulfillment graph and packs. Subscriptions are cleared as part of
//! disposal, so a torn-down node never calls into stale observers.
//!
//! Callbacks run synchronously on the notifying thread, after the
//! registry lock has been released. A callback may therefore subscribe or
//! unsubscribe without deadlocking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`Observers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A list of callbacks interested in events of type `E`.
pub struct Observers<E> {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, Callback<E>)>>,
}

impl<E> Observers<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback. Callbacks fire in subscription order.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Invoke every registered callback with `event`.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.callbacks.lock().clear();
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Whether there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscriptions", &self.len())
            .finish()
    }
}
