//! EventEmitter<T> — a small typed pub/sub primitive.
//!
//! Listeners are stored as `Arc<dyn Fn(&T)>` so emitting only clones
//! ref-counts. The listener list is snapshotted before each emission round:
//! a listener removed during emission is still called in that round, and a
//! listener added during emission is first called on the next emit. The
//! internal lock is never held while a listener runs, so listeners may call
//! `on()`/`off()` freely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifies a registered listener; pass to [`EventEmitter::off`] to remove it.
pub type ListenerId = u64;

/// Closure type for event listeners.
pub type ListenerFn<T> = dyn Fn(&T) + Send + Sync;

/// Typed synchronous event emitter.
pub struct EventEmitter<T> {
    listeners: Mutex<Vec<(ListenerId, Arc<ListenerFn<T>>)>>,
    next_id: AtomicU64,
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` and return its [`ListenerId`].
    pub fn on(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove the listener identified by `id`. Safe to call more than once.
    pub fn off(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// Emit `event` to all listeners registered at the start of the round.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Arc<ListenerFn<T>>> = {
            let guard = self.listeners.lock();
            guard.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for cb in snapshot {
            cb(event);
        }
    }

    /// Number of currently registered listeners.
    pub fn size(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
