//! Domain entities: restaurants, reviews, and the filter spec.
//!
//! Structs here mirror the stored document shape (camelCase field names,
//! epoch-millisecond timestamps) and normalize timestamps to
//! `chrono::DateTime<Utc>` at the serde boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Collection holding all restaurant documents.
pub const RESTAURANTS: &str = "restaurants";

/// Collection path for one restaurant's reviews.
///
/// Reviews are owned by their parent restaurant: the collection is scoped to
/// the restaurant id and reviews never move between restaurants.
pub fn reviews_collection(restaurant_id: &str) -> String {
    format!("restaurants/{restaurant_id}/reviews")
}

// ============================================================================
// PriceTier
// ============================================================================

/// Price tier as an ordinal 1..=4.
///
/// The presentation layer historically encodes tiers as `"$"`..`"$$$$"`;
/// [`PriceTier::from_symbol`] keeps that as an explicit bounded mapping
/// (symbol length → ordinal) instead of accepting arbitrary strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTier(u8);

impl PriceTier {
    /// Build a tier from its ordinal. Only 1..=4 are valid.
    pub fn new(ordinal: u8) -> Result<Self, ValidationError> {
        if (1..=4).contains(&ordinal) {
            Ok(Self(ordinal))
        } else {
            Err(ValidationError::new(
                "price",
                format!("ordinal must be 1..=4, got {ordinal}"),
            ))
        }
    }

    /// Build a tier from a dollar-sign symbol (`"$"` → 1 .. `"$$$$"` → 4).
    pub fn from_symbol(symbol: &str) -> Result<Self, ValidationError> {
        if symbol.is_empty() || symbol.len() > 4 || !symbol.bytes().all(|b| b == b'$') {
            return Err(ValidationError::new(
                "price",
                format!("expected 1-4 dollar signs, got {symbol:?}"),
            ));
        }
        Ok(Self(symbol.len() as u8))
    }

    pub fn ordinal(self) -> u8 {
        self.0
    }

    pub fn symbol(self) -> &'static str {
        match self.0 {
            1 => "$",
            2 => "$$",
            3 => "$$$",
            _ => "$$$$",
        }
    }
}

// ============================================================================
// Restaurant
// ============================================================================

/// One eatery, including its derived rating aggregate.
///
/// `num_ratings`, `sum_rating` and `avg_rating` are only ever written
/// together in the same atomic commit as the review that changed them — no
/// externally observable state has them mutually inconsistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub category: String,
    pub city: String,
    pub price: PriceTier,
    #[serde(default)]
    pub num_ratings: u64,
    #[serde(default)]
    pub sum_rating: f64,
    /// `sum_rating / num_ratings`, or zero while there are no ratings.
    #[serde(default)]
    pub avg_rating: f64,
    /// URL of an externally stored image. The engine only persists the string.
    #[serde(default)]
    pub photo: String,
    /// Denormalized id of the most recent reviewer, for downstream audit
    /// checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_review_user_id: Option<String>,
    /// Creation time, assigned by the store.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied fields for creating a restaurant. The store assigns the
/// id and creation timestamp; the aggregate starts at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRestaurant {
    pub name: String,
    pub category: String,
    pub city: String,
    pub price: PriceTier,
    #[serde(default)]
    pub photo: String,
}

// ============================================================================
// Review
// ============================================================================

/// One user's rating of one restaurant.
///
/// Reviews are created only through the aggregate transaction engine and are
/// never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub restaurant_id: String,
    pub user_id: String,
    pub rating: f64,
    /// Free-form text. May be empty but is always present.
    pub text: String,
    /// Server-assigned write time; strictly increasing within a store.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied fields for submitting a review. The engine assigns the
/// id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub user_id: String,
    pub rating: f64,
    #[serde(default)]
    pub text: String,
}

// ============================================================================
// Filter spec
// ============================================================================

/// Requested result ordering for restaurant queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    /// Highest average rating first (the default).
    Rating,
    /// Most-reviewed first.
    Review,
}

/// Ephemeral, per-request criteria narrowing and ordering a restaurant query.
///
/// Absent fields impose no constraint. Field values are the caller's
/// responsibility — the query builder applies them without validation.
#[derive(Debug, Clone, Default)]
pub struct RestaurantFilter {
    pub category: Option<String>,
    pub city: Option<String>,
    pub price: Option<PriceTier>,
    pub sort: Option<SortBy>,
}

// ============================================================================
// Tests
// ============================================================================
