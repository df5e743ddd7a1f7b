//! ReactiveStore<S> — the snapshot subscription manager.
//!
//! Wraps a [`DocumentStore`] so that every committed write marks the
//! affected subscriptions dirty and flushes them, delivering the *entire*
//! current document state / result set to each subscriber (never diffs).
//!
//! # Threading model
//!
//! Three independent locks:
//!   - `state` — subscription registry and dirty sets (`Arc<Mutex<..>>`,
//!     cloned into unsubscribe closures).
//!   - per-subscription delivery gates (`parking_lot::ReentrantMutex`).
//!   - `emitter` — the global change-event emitter (internally locked).
//!
//! `state` is never held while a subscriber callback runs. A gate *is* held
//! while its own callback runs: that is what makes delivery to one
//! subscription strictly sequential and lets `unsubscribe` block until any
//! in-flight delivery has finished. The gate is reentrant so a callback may
//! unsubscribe its own subscription without deadlocking.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tracing::trace;

use crate::error::{PlatedbError, Result, SubscriptionError};
use crate::query::types::Query;
use crate::store::traits::{
    CommitReceipt, DocumentStore, SequencedRead, VersionedDocument, WriteOp,
};

use super::event::ChangeEvent;
use super::event_emitter::EventEmitter;

// ============================================================================
// Subscription handle
// ============================================================================

/// Handle to an active subscription.
///
/// `unsubscribe` is idempotent: the first call releases the underlying
/// listener registration and waits for any in-flight delivery, so no
/// `on_change` invocation can begin after it returns; later calls are
/// no-ops. Dropping the handle also unsubscribes — the registration is a
/// scoped resource, not something reclaimed lazily.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(cancel: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            cancel: Mutex::new(Some(cancel)),
        }
    }

    /// Cancel the subscription. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// True until the first `unsubscribe` (or drop).
    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ============================================================================
// Delivery gate
// ============================================================================

struct GateState {
    last_sequence: Option<u64>,
    closed: bool,
}

/// Serializes deliveries to one subscription and enforces snapshot order.
///
/// Each delivery is tagged with the commit sequence captured in the same
/// consistent read as the snapshot ([`SequencedRead`]), so the tag is exact
/// for its snapshot. Snapshots tagged older than one already delivered are
/// dropped — a subscriber never observes an older snapshot after a newer
/// one.
struct DeliveryGate {
    inner: ReentrantMutex<RefCell<GateState>>,
}

impl DeliveryGate {
    fn new() -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(GateState {
                last_sequence: None,
                closed: false,
            })),
        }
    }

    /// Run `deliver` under the gate unless the gate is closed or the
    /// snapshot is stale. Panics in the callback are contained.
    fn deliver(&self, sequence: u64, deliver: impl FnOnce()) {
        let guard = self.inner.lock();
        {
            let mut st = guard.borrow_mut();
            if st.closed {
                return;
            }
            if matches!(st.last_sequence, Some(last) if sequence < last) {
                return;
            }
            st.last_sequence = Some(sequence);
        }
        let _ = catch_unwind(AssertUnwindSafe(deliver));
    }

    /// Run an error callback under the gate (no sequence bookkeeping).
    fn deliver_error(&self, deliver: impl FnOnce()) {
        let guard = self.inner.lock();
        if guard.borrow().closed {
            return;
        }
        let _ = catch_unwind(AssertUnwindSafe(deliver));
    }

    /// Close the gate. Blocks until any in-flight delivery on another
    /// thread has finished; reentrant from within the gate's own callback.
    fn close(&self) {
        let guard = self.inner.lock();
        guard.borrow_mut().closed = true;
    }
}

// ============================================================================
// Internal subscription types
// ============================================================================

type ErrorCallback = Arc<dyn Fn(SubscriptionError) + Send + Sync>;

struct DocumentSub {
    id: u64,
    collection: String,
    document_id: String,
    callback: Arc<dyn Fn(Option<Value>) + Send + Sync>,
    on_error: Option<ErrorCallback>,
    gate: Arc<DeliveryGate>,
}

struct QuerySub {
    id: u64,
    collection: String,
    query: Query,
    callback: Arc<dyn Fn(Vec<Value>) + Send + Sync>,
    on_error: Option<ErrorCallback>,
    gate: Arc<DeliveryGate>,
}

struct WatchState {
    /// Active document subscriptions keyed by `"collection:id"`.
    document_subs: HashMap<String, Vec<Arc<DocumentSub>>>,
    /// Active query subscriptions.
    query_subs: Vec<Arc<QuerySub>>,

    /// Subscriptions pending flush.
    dirty_documents: HashMap<String, Vec<Arc<DocumentSub>>>,
    dirty_queries: Vec<Arc<QuerySub>>,

    next_id: u64,
}

impl WatchState {
    fn new() -> Self {
        Self {
            document_subs: HashMap::new(),
            query_subs: Vec::new(),
            dirty_documents: HashMap::new(),
            dirty_queries: Vec::new(),
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Mark the document's own subs and all query subs on its collection
    /// dirty. Query invalidation is conservative: any change in a collection
    /// may start or stop a document matching any query over it.
    fn mark_dirty(&mut self, collection: &str, id: &str) {
        let key = sub_key(collection, id);
        if let Some(subs) = self.document_subs.get(&key) {
            let dirty = self.dirty_documents.entry(key).or_default();
            for sub in subs {
                if !dirty.iter().any(|s| s.id == sub.id) {
                    dirty.push(Arc::clone(sub));
                }
            }
        }

        for sub in &self.query_subs {
            if sub.collection != collection {
                continue;
            }
            if !self.dirty_queries.iter().any(|s| s.id == sub.id) {
                self.dirty_queries.push(Arc::clone(sub));
            }
        }
    }
}

fn sub_key(collection: &str, id: &str) -> String {
    format!("{collection}:{id}")
}

// ============================================================================
// ReactiveStore
// ============================================================================

/// A [`DocumentStore`] with live snapshot subscriptions layered on top.
///
/// Writes must go through this wrapper for subscribers to be notified; it
/// proxies the full `DocumentStore` contract so callers can treat it as the
/// store itself.
pub struct ReactiveStore<S: DocumentStore> {
    inner: S,
    state: Arc<Mutex<WatchState>>,
    emitter: Arc<EventEmitter<ChangeEvent>>,
}

impl<S: DocumentStore> ReactiveStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: Arc::new(Mutex::new(WatchState::new())),
            emitter: Arc::new(EventEmitter::new()),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Watch one document. The callback fires once immediately with the
    /// current state (`None` while the document does not exist) and again
    /// after every committed change to it.
    pub fn watch_document(
        &self,
        collection: impl Into<String>,
        id: impl Into<String>,
        callback: impl Fn(Option<Value>) + Send + Sync + 'static,
        on_error: Option<ErrorCallback>,
    ) -> Subscription {
        let collection = collection.into();
        let document_id = id.into();
        let key = sub_key(&collection, &document_id);
        let gate = Arc::new(DeliveryGate::new());

        let sub_id;
        {
            let mut st = self.state.lock();
            let new_id = st.next_id();
            sub_id = new_id;
            let sub = Arc::new(DocumentSub {
                id: new_id,
                collection,
                document_id,
                callback: Arc::new(callback),
                on_error,
                gate: Arc::clone(&gate),
            });
            st.document_subs
                .entry(key.clone())
                .or_default()
                .push(Arc::clone(&sub));
            st.dirty_documents.entry(key.clone()).or_default().push(sub);
        }
        trace!(key = key.as_str(), sub_id, "document subscription registered");
        self.flush();

        let state = Arc::clone(&self.state);
        Subscription::new(Box::new(move || {
            gate.close();
            let mut st = state.lock();
            if let Some(subs) = st.document_subs.get_mut(&key) {
                subs.retain(|s| s.id != sub_id);
                if subs.is_empty() {
                    st.document_subs.remove(&key);
                }
            }
            if let Some(dirty) = st.dirty_documents.get_mut(&key) {
                dirty.retain(|s| s.id != sub_id);
                if dirty.is_empty() {
                    st.dirty_documents.remove(&key);
                }
            }
        }))
    }

    /// Watch a query over a collection. The callback fires once immediately
    /// with the full current result set and again whenever any document in
    /// the collection begins or stops matching, or a matching document's
    /// fields change.
    pub fn watch_query(
        &self,
        collection: impl Into<String>,
        query: Query,
        callback: impl Fn(Vec<Value>) + Send + Sync + 'static,
        on_error: Option<ErrorCallback>,
    ) -> Subscription {
        let collection = collection.into();
        let gate = Arc::new(DeliveryGate::new());

        let sub_id;
        {
            let mut st = self.state.lock();
            let new_id = st.next_id();
            sub_id = new_id;
            let sub = Arc::new(QuerySub {
                id: new_id,
                collection: collection.clone(),
                query,
                callback: Arc::new(callback),
                on_error,
                gate: Arc::clone(&gate),
            });
            st.query_subs.push(Arc::clone(&sub));
            st.dirty_queries.push(sub);
        }
        trace!(
            collection = collection.as_str(),
            sub_id,
            "query subscription registered"
        );
        self.flush();

        let state = Arc::clone(&self.state);
        Subscription::new(Box::new(move || {
            gate.close();
            let mut st = state.lock();
            st.query_subs.retain(|s| s.id != sub_id);
            st.dirty_queries.retain(|s| s.id != sub_id);
        }))
    }

    /// Listen to every raw [`ChangeEvent`].
    pub fn on_change(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let listener_id = self.emitter.on(callback);
        let emitter = Arc::clone(&self.emitter);
        Subscription::new(Box::new(move || {
            emitter.off(listener_id);
        }))
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    /// Service all dirty subscriptions.
    ///
    /// For each one: take a sequenced read of the current state and deliver
    /// through the subscription's gate, ordered by the read's sequence tag.
    /// No engine lock is held while a callback runs. Read or query failures
    /// go to the subscription's `on_error` callback as a
    /// [`SubscriptionError`] — the subscription stays registered so the
    /// caller can decide whether to resubscribe.
    pub fn flush(&self) {
        let (dirty_documents, dirty_queries) = {
            let mut st = self.state.lock();
            let documents: Vec<Arc<DocumentSub>> = st
                .dirty_documents
                .drain()
                .flat_map(|(_, subs)| subs)
                .collect();
            let queries: Vec<Arc<QuerySub>> = st.dirty_queries.drain(..).collect();
            (documents, queries)
        };

        for sub in dirty_documents {
            match self.inner.get_sequenced(&sub.collection, &sub.document_id) {
                Ok(read) => {
                    let data = read.value.map(|d| d.data);
                    sub.gate.deliver(read.sequence, || (sub.callback)(data));
                }
                Err(e) => Self::report(&sub.gate, sub.on_error.as_ref(), &sub.collection, e),
            }
        }

        for sub in dirty_queries {
            match self.inner.query_sequenced(&sub.collection, &sub.query) {
                Ok(read) => {
                    sub.gate.deliver(read.sequence, || (sub.callback)(read.value));
                }
                Err(e) => Self::report(&sub.gate, sub.on_error.as_ref(), &sub.collection, e),
            }
        }
    }

    fn report(
        gate: &DeliveryGate,
        on_error: Option<&ErrorCallback>,
        collection: &str,
        error: PlatedbError,
    ) {
        if let Some(on_error) = on_error {
            let err = SubscriptionError {
                collection: collection.to_string(),
                source: Box::new(error),
            };
            gate.deliver_error(|| on_error(err));
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn notify(&self, receipt: &CommitReceipt) {
        for written in &receipt.written {
            let event = if written.created {
                ChangeEvent::Created {
                    collection: written.collection.clone(),
                    id: written.id.clone(),
                }
            } else {
                ChangeEvent::Updated {
                    collection: written.collection.clone(),
                    id: written.id.clone(),
                }
            };
            // Panics from on_change listeners must never prevent the
            // dirty-mark + flush that follows a committed write.
            let _ = catch_unwind(AssertUnwindSafe(|| self.emitter.emit(&event)));
        }

        let mut st = self.state.lock();
        for written in &receipt.written {
            st.mark_dirty(&written.collection, &written.id);
        }
    }
}

// ============================================================================
// DocumentStore — proxy + notify
// ============================================================================

impl<S: DocumentStore> DocumentStore for ReactiveStore<S> {
    fn get_sequenced(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<SequencedRead<Option<VersionedDocument>>> {
        self.inner.get_sequenced(collection, id)
    }

    fn query_sequenced(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<SequencedRead<Vec<Value>>> {
        self.inner.query_sequenced(collection, query)
    }

    fn commit(&self, ops: Vec<WriteOp>) -> Result<CommitReceipt> {
        let receipt = self.inner.commit(ops)?;
        self.notify(&receipt);
        self.flush();
        Ok(receipt)
    }

    fn sequence(&self) -> u64 {
        self.inner.sequence()
    }
}

// ============================================================================
// Tests
// ============================================================================
