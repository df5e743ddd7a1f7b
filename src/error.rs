use thiserror::Error;

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// A failed precondition on caller-supplied input.
///
/// Raised before any store access — validation failures never leave
/// half-applied state behind.
#[derive(Debug, Clone, Error)]
#[error(r#"Validation failed for "{field}": {message}"#)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Version conflict on {collection}/{id}: expected v{expected}, found v{found}")]
    Conflict {
        collection: String,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("Corrupt document in {collection}/{id}")]
    Corrupt {
        collection: String,
        id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

// ---------------------------------------------------------------------------
// QueryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

// ---------------------------------------------------------------------------
// TransactionError
// ---------------------------------------------------------------------------

/// An aggregate update that could not be committed after exhausting the
/// engine's conditional-write retries. Always surfaced to the caller.
#[derive(Debug, Error)]
#[error("Aggregate update for {collection}/{id} abandoned after {attempts} attempts")]
pub struct TransactionError {
    pub collection: String,
    pub id: String,
    pub attempts: u32,
    #[source]
    pub source: StoreError,
}

// ---------------------------------------------------------------------------
// SubscriptionError
// ---------------------------------------------------------------------------

/// A live subscription failed to materialize a snapshot.
///
/// Reported through the subscription's out-of-band error callback, never by
/// silently stopping delivery. The subscription itself stays registered; the
/// caller decides whether to unsubscribe and resubscribe.
#[derive(Debug, Error)]
#[error(r#"Snapshot delivery for "{collection}" failed"#)]
pub struct SubscriptionError {
    pub collection: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

// ---------------------------------------------------------------------------
// PlatedbError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlatedbError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

impl PlatedbError {
    /// True if this error means the referenced document does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }
}

/// Convenience alias — the default error type is `PlatedbError`.
pub type Result<T, E = PlatedbError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let e = ValidationError::new("userId", "must not be empty");
        assert_eq!(
            e.to_string(),
            r#"Validation failed for "userId": must not be empty"#
        );
    }

    #[test]
    fn store_error_not_found_display() {
        let e = StoreError::NotFound {
            collection: "restaurants".to_string(),
            id: "abc".to_string(),
        };
        assert_eq!(e.to_string(), "Document not found: restaurants/abc");
    }

    #[test]
    fn store_error_conflict_mentions_versions() {
        let e = StoreError::Conflict {
            collection: "restaurants".to_string(),
            id: "abc".to_string(),
            expected: 3,
            found: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("v3"), "expected version missing: {msg}");
        assert!(msg.contains("v5"), "found version missing: {msg}");
    }

    #[test]
    fn transaction_error_mentions_attempts() {
        let e = TransactionError {
            collection: "restaurants".to_string(),
            id: "abc".to_string(),
            attempts: 8,
            source: StoreError::Conflict {
                collection: "restaurants".to_string(),
                id: "abc".to_string(),
                expected: 1,
                found: 2,
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("8 attempts"), "attempt count missing: {msg}");
    }

    #[test]
    fn platedb_error_from_validation() {
        let e: PlatedbError = ValidationError::new("rating", "missing").into();
        assert!(matches!(e, PlatedbError::Validation(_)));
    }

    #[test]
    fn is_not_found_matches_store_variant_only() {
        let nf: PlatedbError = StoreError::NotFound {
            collection: "restaurants".to_string(),
            id: "x".to_string(),
        }
        .into();
        assert!(nf.is_not_found());

        let v: PlatedbError = ValidationError::new("id", "empty").into();
        assert!(!v.is_not_found());
    }
}
