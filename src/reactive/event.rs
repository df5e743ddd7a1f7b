//! ChangeEvent — one committed mutation to the store.
//!
//! Emitted by `ReactiveStore` after each committed write so that listeners
//! know which collection/document changed.

/// A change event emitted after a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A new document was inserted.
    Created { collection: String, id: String },
    /// An existing document's data was replaced.
    Updated { collection: String, id: String },
}

impl ChangeEvent {
    /// The collection that was affected.
    pub fn collection(&self) -> &str {
        match self {
            Self::Created { collection, .. } => collection,
            Self::Updated { collection, .. } => collection,
        }
    }

    /// The id of the affected document.
    pub fn id(&self) -> &str {
        match self {
            Self::Created { id, .. } => id,
            Self::Updated { id, .. } => id,
        }
    }
}
