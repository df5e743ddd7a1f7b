//! Predicate evaluation for the query engine: value ordering, field path
//! resolution, and equality filter matching.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::QueryError;

// ============================================================================
// Value Comparison
// ============================================================================

/// Compare two JSON values for ordering.
///
/// - Both Null → Equal
/// - a is Null → Greater (nulls sort to end)
/// - b is Null → Less
/// - Both numbers → f64 comparison (NaN treated as Equal)
/// - Both strings → lexicographic (codepoint order)
/// - Both booleans → false < true
/// - Cross-type → type rank: number(0), string(1), bool(2), other(3)
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(na), Value::Number(nb)) => {
            let fa = na.as_f64().unwrap_or(f64::NAN);
            let fb = nb.as_f64().unwrap_or(f64::NAN);
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        }
        (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        _ => 3,
    }
}

// ============================================================================
// Field Path Resolution
// ============================================================================

/// Get a nested value from a document using a dot-separated path.
/// Returns `None` if any path segment is missing or the parent is not an object.
pub fn get_field_value<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

// ============================================================================
// Filter Matching
// ============================================================================

/// Check whether `document` satisfies every equality predicate in `filter`.
///
/// `filter` must be a JSON object; each entry is a dotted field path that
/// must deep-equal the given value. A missing field only matches an explicit
/// null predicate.
pub fn matches_filter(document: &Value, filter: &Value) -> Result<bool, QueryError> {
    let predicates = filter.as_object().ok_or_else(|| {
        QueryError::InvalidFilter(format!("expected an object, got {filter}"))
    })?;

    for (path, expected) in predicates {
        let actual = get_field_value(document, path).unwrap_or(&Value::Null);
        if actual != expected {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Keep only documents matching `filter`.
pub fn filter_documents(documents: Vec<Value>, filter: &Value) -> Result<Vec<Value>, QueryError> {
    let mut matched = Vec::with_capacity(documents.len());
    for doc in documents {
        if matches_filter(&doc, filter)? {
            matched.push(doc);
        }
    }
    Ok(matched)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compare_numbers() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2.5)), Ordering::Equal);
    }

    #[test]
    fn nulls_sort_to_end() {
        assert_eq!(compare_values(&json!(null), &json!(1)), Ordering::Greater);
        assert_eq!(compare_values(&json!("a"), &json!(null)), Ordering::Less);
    }

    #[test]
    fn cross_type_uses_rank() {
        assert_eq!(compare_values(&json!(1), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!("a")), Ordering::Greater);
    }

    #[test]
    fn get_field_value_dotted_path() {
        let doc = json!({ "a": { "b": 7 } });
        assert_eq!(get_field_value(&doc, "a.b"), Some(&json!(7)));
        assert_eq!(get_field_value(&doc, "a.c"), None);
        assert_eq!(get_field_value(&doc, "x"), None);
    }

    #[test]
    fn matches_filter_all_predicates_must_hold() {
        let doc = json!({ "category": "Indian", "city": "Oakland", "price": 2 });
        let both = json!({ "category": "Indian", "price": 2 });
        assert!(matches_filter(&doc, &both).unwrap());

        let wrong = json!({ "category": "Indian", "price": 3 });
        assert!(!matches_filter(&doc, &wrong).unwrap());
    }

    #[test]
    fn matches_filter_missing_field_only_matches_null() {
        let doc = json!({ "category": "Indian" });
        assert!(!matches_filter(&doc, &json!({ "city": "Oakland" })).unwrap());
        assert!(matches_filter(&doc, &json!({ "city": null })).unwrap());
    }

    #[test]
    fn matches_filter_rejects_non_object() {
        let doc = json!({});
        assert!(matches_filter(&doc, &json!("category")).is_err());
    }

    #[test]
    fn filter_documents_keeps_matches_in_order() {
        let docs = vec![
            json!({ "city": "Oakland", "n": 1 }),
            json!({ "city": "Berkeley", "n": 2 }),
            json!({ "city": "Oakland", "n": 3 }),
        ];
        let out = filter_documents(docs, &json!({ "city": "Oakland" })).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["n"], json!(1));
        assert_eq!(out[1]["n"], json!(3));
    }
}
