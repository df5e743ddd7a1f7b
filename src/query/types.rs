//! Query type definitions: filter, sort, and the composed query value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Sort Types
// ============================================================================

/// Sort direction for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A sort specification for a single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub direction: SortDirection,
}

impl SortEntry {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }
}

// ============================================================================
// Query Type
// ============================================================================

/// Complete query specification: equality predicates plus ordering.
///
/// `filter` is an object whose entries are dotted field paths mapped to the
/// value the field must equal. Queries produced by the builder always carry
/// at least one sort entry.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Option<Value>,
    pub sort: Vec<SortEntry>,
}

// ============================================================================
// Tests
// ============================================================================
