//! MemoryStore — an in-memory `DocumentStore` with per-document versions
//! and compare-and-swap commits.
//!
//! All reads take the shared lock; commits take the exclusive lock, check
//! every conditional op, then apply every op, so a commit is atomic and
//! serialized with respect to every other commit. Commits touching different
//! documents never invalidate each other — conflicts are per-document
//! version checks.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::query::execute::execute_query;
use crate::query::types::Query;

use super::traits::{
    CommitReceipt, DocumentStore, SequencedRead, VersionedDocument, WriteOp, WrittenDocument,
};

// ============================================================================
// Monotonic clock
// ============================================================================

/// Wall-clock milliseconds forced to be strictly increasing.
///
/// Two inserts in the same millisecond still get distinct, ordered
/// timestamps, which keeps review ordering total within a store.
struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    fn now_millis(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

struct StoredDocument {
    data: Value,
    version: u64,
}

/// In-memory versioned document store.
///
/// Collections are created lazily on first insert. Within a collection,
/// documents iterate in insertion order of their ids' sort order (BTreeMap),
/// giving queries a deterministic scan order before sorting.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, StoredDocument>>>,
    sequence: AtomicU64,
    clock: MonotonicClock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            clock: MonotonicClock::new(),
        }
    }

    fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn get_sequenced(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<SequencedRead<Option<VersionedDocument>>> {
        let collections = self.collections.read();
        let value = collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|doc| VersionedDocument {
                data: doc.data.clone(),
                version: doc.version,
            });
        // Commits bump the sequence while still holding the write lock, so
        // a sequence read under the read lock is exact for this value.
        let sequence = self.sequence.load(Ordering::SeqCst);
        Ok(SequencedRead { sequence, value })
    }

    fn query_sequenced(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<SequencedRead<Vec<Value>>> {
        let (documents, sequence) = {
            let collections = self.collections.read();
            let documents: Vec<Value> = collections
                .get(collection)
                .map(|docs| docs.values().map(|d| d.data.clone()).collect())
                .unwrap_or_default();
            (documents, self.sequence.load(Ordering::SeqCst))
        };
        // Lock released — execution is pure.
        Ok(SequencedRead {
            sequence,
            value: execute_query(documents, query)?,
        })
    }

    fn commit(&self, ops: Vec<WriteOp>) -> Result<CommitReceipt> {
        let mut collections = self.collections.write();

        // Phase 1: check every conditional op before touching anything.
        for op in &ops {
            if let WriteOp::Update {
                collection,
                id,
                expected_version,
                ..
            } = op
            {
                let current = collections
                    .get(collection.as_str())
                    .and_then(|docs| docs.get(id.as_str()))
                    .ok_or_else(|| StoreError::NotFound {
                        collection: collection.clone(),
                        id: id.clone(),
                    })?;
                if current.version != *expected_version {
                    debug!(
                        collection = collection.as_str(),
                        id = id.as_str(),
                        expected = expected_version,
                        found = current.version,
                        "commit rejected: version conflict"
                    );
                    return Err(StoreError::Conflict {
                        collection: collection.clone(),
                        id: id.clone(),
                        expected: *expected_version,
                        found: current.version,
                    }
                    .into());
                }
            }
        }

        // Phase 2: apply. Nothing below can fail.
        let mut written = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                WriteOp::Insert { collection, mut data } => {
                    let id = Self::generate_id();
                    if let Some(obj) = data.as_object_mut() {
                        obj.insert("id".to_string(), Value::from(id.clone()));
                        obj.insert(
                            "timestamp".to_string(),
                            Value::from(self.clock.now_millis()),
                        );
                    }
                    collections.entry(collection.clone()).or_default().insert(
                        id.clone(),
                        StoredDocument {
                            data: data.clone(),
                            version: 1,
                        },
                    );
                    written.push(WrittenDocument {
                        collection,
                        id,
                        data,
                        created: true,
                    });
                }
                WriteOp::Update {
                    collection,
                    id,
                    data,
                    expected_version,
                } => {
                    // Checked in phase 1; the entry is present.
                    if let Some(doc) = collections
                        .get_mut(collection.as_str())
                        .and_then(|docs| docs.get_mut(id.as_str()))
                    {
                        doc.data = data.clone();
                        doc.version = expected_version + 1;
                    }
                    written.push(WrittenDocument {
                        collection,
                        id,
                        data,
                        created: false,
                    });
                }
            }
        }

        // Still under the write lock: a sequenced read can never pair the
        // new data with the old sequence or vice versa.
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(sequence, writes = written.len(), "commit applied");
        Ok(CommitReceipt { sequence, written })
    }

    fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================
