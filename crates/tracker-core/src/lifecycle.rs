//! Host lifecycle notifications and listener subscriptions.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// A lifecycle transition reported by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Foreground,
    /// The host left the foreground; pending events are sent.
    Background,
    /// The host is short on memory; requests shrink until recovery.
    LowMemory,
    MemoryRecovered,
}

/// Receives lifecycle transitions.
pub trait LifecycleListener: Send + Sync {
    fn on_lifecycle(&self, event: AppLifecycle);
}

impl<F> LifecycleListener for F
where
    F: Fn(AppLifecycle) + Send + Sync,
{
    fn on_lifecycle(&self, event: AppLifecycle) {
        self(event)
    }
}

/// Listener table owned by one tracker.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<u64, Arc<dyn LifecycleListener>>>,
}

impl Listeners {
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        listener: Arc<dyn LifecycleListener>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(id, listener);
        Subscription {
            id,
            listeners: Arc::downgrade(self),
        }
    }

    /// Deliver in subscription order. Listeners run outside the table lock
    /// and may unsubscribe themselves or others.
    pub(crate) fn notify(&self, event: AppLifecycle) {
        let snapshot: Vec<_> = self.entries.lock().values().cloned().collect();
        for listener in snapshot {
            listener.on_lifecycle(event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn clear(&self) {
        let dropped = std::mem::take(&mut *self.entries.lock());
        debug!(listeners = dropped.len(), "lifecycle listeners released");
    }

    fn remove(&self, id: u64) -> bool {
        self.entries.lock().remove(&id).is_some()
    }
}

/// Handle keeping a listener registered.
///
/// Dropping the handle unsubscribes. Shutting the tracker down releases
/// every listener even if handles are still alive.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.listeners
            .upgrade()
            .is_some_and(|listeners| listeners.entries.lock().contains_key(&self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}
