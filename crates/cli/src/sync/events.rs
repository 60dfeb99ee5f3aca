// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Listener registries and the change events the data manager emits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use sb_core::EntityType;

use super::reconcile::SyncReport;

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A set of callbacks notified in registration order.
///
/// Callbacks run on the notifying task with the registry unlocked, so a
/// listener may add or remove listeners from inside its callback.
pub struct Listeners<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Callback<E>)>>,
}

impl<E> Listeners<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Listeners {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback.
    pub fn add(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(callback)));
        id
    }

    /// Unregister a callback. Returns false if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback with the event.
    pub fn notify(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Callback<E>)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Changes observable through [`DataManager::subscribe`](super::DataManager::subscribe).
#[derive(Debug, Clone, PartialEq)]
pub enum DataEvent {
    /// A local write changed cached records of this type.
    Changed { entity: EntityType },
    /// A reconciliation pass finished.
    Synced(SyncReport),
    /// A reconciliation pass could not run or aborted.
    SyncFailed { message: String },
    /// The cache was reloaded from the remote store or from shared storage.
    Reloaded,
}

/// Registration returned by `subscribe`.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to stop receiving events.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<Listeners<DataEvent>>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, registry: &Arc<Listeners<DataEvent>>) -> Self {
        Subscription {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
