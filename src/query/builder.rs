//! Declarative filter spec → executable query.
//!
//! Pure functions: same filter spec always yields an equivalent query.
//! Malformed filter values are the caller's responsibility — nothing is
//! validated here.

use serde_json::{Map, Value};

use crate::model::{RestaurantFilter, SortBy};

use super::types::{Query, SortEntry};

/// Build the restaurant query for a filter spec.
///
/// Equality predicates are applied in a fixed order — category, then city,
/// then price as its ordinal — each only when present (and, for strings,
/// non-empty). Exactly one sort clause is always emitted: `SortBy::Review`
/// orders by `numRatings` descending, anything else (including no sort, the
/// `Rating` default) orders by `avgRating` descending.
pub fn restaurant_query(filter: &RestaurantFilter) -> Query {
    let mut predicates = Map::new();

    if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
        predicates.insert("category".to_string(), Value::from(category));
    }
    if let Some(city) = filter.city.as_deref().filter(|c| !c.is_empty()) {
        predicates.insert("city".to_string(), Value::from(city));
    }
    if let Some(price) = filter.price {
        predicates.insert("price".to_string(), Value::from(price.ordinal()));
    }

    let sort_field = match filter.sort {
        Some(SortBy::Review) => "numRatings",
        _ => "avgRating",
    };

    Query {
        filter: (!predicates.is_empty()).then(|| Value::Object(predicates)),
        sort: vec![SortEntry::desc(sort_field)],
    }
}

/// Build the reviews query: no predicates, newest first.
///
/// Shared by the one-shot and live review paths so both always apply the
/// same ordering.
pub fn reviews_query() -> Query {
    Query {
        filter: None,
        sort: vec![SortEntry::desc("timestamp")],
    }
}

// ============================================================================
// Tests
// ============================================================================
