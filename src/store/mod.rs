//! Store layer — the `DocumentStore` capability and the in-memory backend.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{
    CommitReceipt, DocumentStore, SequencedRead, VersionedDocument, WriteOp, WrittenDocument,
};
