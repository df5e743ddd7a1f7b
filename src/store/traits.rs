//! Document store capability traits.
//!
//! `DocumentStore` is the narrow capability set the engine needs from a
//! backing store: point reads, query execution, atomic conditional commits,
//! and a monotonic commit sequence for snapshot ordering. Implementors must
//! be `Send + Sync`; every component receives its store explicitly — there
//! is no process-wide store handle.

use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::query::types::Query;

// ============================================================================
// Versioned documents and write operations
// ============================================================================

/// A document read together with the version to use for conditional writes.
#[derive(Debug, Clone)]
pub struct VersionedDocument {
    pub data: Value,
    pub version: u64,
}

/// One write inside an atomic commit.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert a new document. The store assigns an `id` field and stamps a
    /// `timestamp` field (epoch milliseconds, strictly increasing within the
    /// store), overwriting any caller-supplied values for either.
    Insert { collection: String, data: Value },
    /// Replace a document's data, conditional on the version observed at
    /// read time. Fails the whole commit with `StoreError::Conflict` on a
    /// version mismatch, or `StoreError::NotFound` if the document is gone.
    Update {
        collection: String,
        id: String,
        data: Value,
        expected_version: u64,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            Self::Insert { collection, .. } => collection,
            Self::Update { collection, .. } => collection,
        }
    }
}

/// A document as it was committed, echoed back to the caller.
#[derive(Debug, Clone)]
pub struct WrittenDocument {
    pub collection: String,
    pub id: String,
    pub data: Value,
    /// True if this write created the document.
    pub created: bool,
}

/// Outcome of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    /// The store sequence assigned to this commit.
    pub sequence: u64,
    /// Final state of every written document, in op order.
    pub written: Vec<WrittenDocument>,
}

/// A read paired with the commit sequence current when it was taken.
///
/// Implementations capture the value and the sequence under the same lock,
/// so the tag exactly matches the value's recency. The reactive layer orders
/// snapshot deliveries by this tag; a tag captured outside the read's
/// critical section would under- or over-report recency and let a stale
/// snapshot slip past the ordering gate.
#[derive(Debug, Clone)]
pub struct SequencedRead<T> {
    pub sequence: u64,
    pub value: T,
}

// ============================================================================
// DocumentStore
// ============================================================================

/// The opaque store capability: sequenced reads, `commit`, `sequence`.
pub trait DocumentStore: Send + Sync {
    /// Fetch one document by collection and id, paired with the commit
    /// sequence current at the read. `value` is `None` if absent. The
    /// sequence must be captured atomically with the read.
    fn get_sequenced(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<SequencedRead<Option<VersionedDocument>>>;

    /// Execute a query over a collection, paired with the commit sequence
    /// current at the read. Matching document data in query order; the
    /// sequence must be captured atomically with the scan.
    fn query_sequenced(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<SequencedRead<Vec<Value>>>;

    /// Apply all ops atomically: either every op applies or none do.
    /// Conditional ops are checked against current versions first, so a
    /// commit can never partially apply.
    fn commit(&self, ops: Vec<WriteOp>) -> Result<CommitReceipt>;

    /// Monotonic counter incremented by every successful commit. Snapshots
    /// read at a higher sequence are never older than snapshots read at a
    /// lower one.
    fn sequence(&self) -> u64;

    /// Fetch one document by collection and id. `None` if absent.
    fn get(&self, collection: &str, id: &str) -> Result<Option<VersionedDocument>> {
        Ok(self.get_sequenced(collection, id)?.value)
    }

    /// Execute a query over a collection, returning matching document data
    /// in query order.
    fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>> {
        Ok(self.query_sequenced(collection, query)?.value)
    }

    /// Insert a single document. Convenience wrapper over [`commit`].
    ///
    /// [`commit`]: DocumentStore::commit
    fn insert(&self, collection: &str, data: Value) -> Result<WrittenDocument> {
        let receipt = self.commit(vec![WriteOp::Insert {
            collection: collection.to_string(),
            data,
        }])?;
        receipt.written.into_iter().next().ok_or_else(|| {
            StoreError::Corrupt {
                collection: collection.to_string(),
                id: String::new(),
                source: "commit receipt missing inserted document".into(),
            }
            .into()
        })
    }
}
