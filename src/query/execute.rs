//! Query execution — scan-and-filter with cascading sort.

use serde_json::Value;

use crate::error::QueryError;

use super::operators::{compare_values, filter_documents, get_field_value};
use super::types::{Query, SortDirection, SortEntry};

// ============================================================================
// Sorting
// ============================================================================

/// Sort documents by multiple fields with cascading priority.
///
/// The sort is stable: documents equal under every entry keep their incoming
/// order, so repeated executions over unchanged data produce identical
/// snapshots.
pub fn sort_documents(mut documents: Vec<Value>, sort: &[SortEntry]) -> Vec<Value> {
    if sort.is_empty() {
        return documents;
    }

    documents.sort_by(|a, b| {
        for entry in sort {
            let va = get_field_value(a, &entry.field).unwrap_or(&Value::Null);
            let vb = get_field_value(b, &entry.field).unwrap_or(&Value::Null);
            let cmp = compare_values(va, vb);
            if cmp != std::cmp::Ordering::Equal {
                return if entry.direction == SortDirection::Desc {
                    cmp.reverse()
                } else {
                    cmp
                };
            }
        }
        std::cmp::Ordering::Equal
    });

    documents
}

// ============================================================================
// Query Execution
// ============================================================================

/// Execute a query against a list of documents.
///
/// 1. Apply equality filter (if present).
/// 2. Sort by the query's sort entries.
pub fn execute_query(documents: Vec<Value>, query: &Query) -> Result<Vec<Value>, QueryError> {
    let filtered = if let Some(filter) = &query.filter {
        filter_documents(documents, filter)?
    } else {
        documents
    };

    Ok(sort_documents(filtered, &query.sort))
}

// ============================================================================
// Tests
// ============================================================================
