//! Aggregate transaction engine — atomic review submission.
//!
//! A review is never just an insert: it also advances the parent
//! restaurant's rating aggregate, and the two writes must be indivisible.
//! The engine reads the restaurant with its version, computes the new
//! aggregate with a pure function, and commits a conditional multi-write:
//! update the restaurant (expecting the observed version) plus insert the
//! review. A concurrent submission on the same restaurant makes the
//! conditional check fail, and the engine retries with exponential backoff;
//! submissions on different restaurants never conflict.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PlatedbError, Result, StoreError, TransactionError, ValidationError};
use crate::model::{reviews_collection, NewReview, Review, RESTAURANTS};
use crate::store::traits::{DocumentStore, WriteOp};

/// Conditional-write attempts before giving up with a `TransactionError`.
pub(crate) const MAX_COMMIT_ATTEMPTS: u32 = 8;

const BASE_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(64);

// ============================================================================
// RatingAggregate
// ============================================================================

/// The derived rating summary stored on a restaurant document.
///
/// All three fields are recomputed together; `avg_rating` is always exactly
/// `sum_rating / num_ratings` (zero while there are no ratings).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RatingAggregate {
    pub num_ratings: u64,
    pub sum_rating: f64,
    pub avg_rating: f64,
}

impl RatingAggregate {
    /// Fold one more rating into the aggregate. Pure.
    pub fn apply(self, rating: f64) -> Self {
        let num_ratings = self.num_ratings + 1;
        let sum_rating = self.sum_rating + rating;
        Self {
            num_ratings,
            sum_rating,
            avg_rating: sum_rating / num_ratings as f64,
        }
    }
}

// ============================================================================
// Review submission
// ============================================================================

/// Submit a review, atomically advancing the restaurant's aggregate.
///
/// Fails fast with a `ValidationError` before any store access when
/// `restaurant_id` or the review's `user_id` is empty, or the rating is not
/// a finite number. A missing restaurant surfaces as `NotFound` and is never
/// retried; version conflicts are retried up to the attempt bound and then
/// surface as a `TransactionError`.
pub fn submit_review(
    store: &impl DocumentStore,
    restaurant_id: &str,
    review: &NewReview,
) -> Result<Review> {
    if restaurant_id.is_empty() {
        return Err(ValidationError::new("restaurantId", "must not be empty").into());
    }
    if review.user_id.is_empty() {
        return Err(ValidationError::new("userId", "must not be empty").into());
    }
    if !review.rating.is_finite() {
        return Err(ValidationError::new("rating", "must be a finite number").into());
    }

    let mut attempt = 0;
    loop {
        attempt += 1;

        let restaurant = store
            .get(RESTAURANTS, restaurant_id)?
            .ok_or_else(|| StoreError::NotFound {
                collection: RESTAURANTS.to_string(),
                id: restaurant_id.to_string(),
            })?;

        let aggregate = read_aggregate(&restaurant.data, restaurant_id)?;
        let updated = aggregate.apply(review.rating);

        let mut data = restaurant.data.clone();
        if let Some(obj) = data.as_object_mut() {
            obj.insert("numRatings".to_string(), Value::from(updated.num_ratings));
            obj.insert("sumRating".to_string(), Value::from(updated.sum_rating));
            obj.insert("avgRating".to_string(), Value::from(updated.avg_rating));
            obj.insert(
                "lastReviewUserId".to_string(),
                Value::from(review.user_id.clone()),
            );
        }

        let reviews = reviews_collection(restaurant_id);
        let review_doc = serde_json::json!({
            "restaurantId": restaurant_id,
            "userId": review.user_id,
            "rating": review.rating,
            "text": review.text,
        });

        let ops = vec![
            WriteOp::Update {
                collection: RESTAURANTS.to_string(),
                id: restaurant_id.to_string(),
                data,
                expected_version: restaurant.version,
            },
            WriteOp::Insert {
                collection: reviews.clone(),
                data: review_doc,
            },
        ];

        match store.commit(ops) {
            Ok(receipt) => {
                let inserted = receipt
                    .written
                    .into_iter()
                    .find(|w| w.created)
                    .ok_or_else(|| StoreError::Corrupt {
                        collection: reviews.clone(),
                        id: String::new(),
                        source: "commit receipt missing inserted review".into(),
                    })?;
                let review: Review =
                    serde_json::from_value(inserted.data).map_err(|e| StoreError::Corrupt {
                        collection: reviews,
                        id: inserted.id,
                        source: Box::new(e),
                    })?;
                return Ok(review);
            }
            Err(PlatedbError::Store(conflict @ StoreError::Conflict { .. })) => {
                if attempt >= MAX_COMMIT_ATTEMPTS {
                    warn!(
                        restaurant_id,
                        attempts = attempt,
                        "review submission abandoned after contention"
                    );
                    return Err(TransactionError {
                        collection: RESTAURANTS.to_string(),
                        id: restaurant_id.to_string(),
                        attempts: attempt,
                        source: conflict,
                    }
                    .into());
                }
                let backoff = backoff_for(attempt);
                debug!(
                    restaurant_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "version conflict, retrying review submission"
                );
                thread::sleep(backoff);
            }
            // NotFound (restaurant deleted mid-flight) and everything else
            // propagates unretried.
            Err(other) => return Err(other),
        }
    }
}

fn read_aggregate(data: &Value, restaurant_id: &str) -> Result<RatingAggregate> {
    serde_json::from_value(data.clone()).map_err(|e| {
        StoreError::Corrupt {
            collection: RESTAURANTS.to_string(),
            id: restaurant_id.to_string(),
            source: Box::new(e),
        }
        .into()
    })
}

fn backoff_for(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF.saturating_mul(1u32 << (attempt - 1).min(16));
    exp.min(MAX_BACKOFF)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_from_empty() {
        let agg = RatingAggregate::default().apply(4.0);
        assert_eq!(agg.num_ratings, 1);
        assert_eq!(agg.sum_rating, 4.0);
        assert_eq!(agg.avg_rating, 4.0);
    }

    #[test]
    fn apply_accumulates_exactly() {
        let agg = RatingAggregate::default().apply(5.0).apply(3.0).apply(4.0);
        assert_eq!(agg.num_ratings, 3);
        assert_eq!(agg.sum_rating, 12.0);
        assert!((agg.avg_rating - 4.0).abs() < 1e-9);
    }

    #[test]
    fn avg_is_always_sum_over_count() {
        let mut agg = RatingAggregate::default();
        for rating in [1.5, 2.0, 4.5, 3.0, 5.0, 0.5] {
            agg = agg.apply(rating);
            let expected = agg.sum_rating / agg.num_ratings as f64;
            assert!((agg.avg_rating - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn read_aggregate_treats_missing_fields_as_zero() {
        let agg = read_aggregate(&serde_json::json!({ "name": "Taj" }), "r1").unwrap();
        assert_eq!(agg, RatingAggregate::default());
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_for(1), Duration::from_millis(1));
        assert_eq!(backoff_for(2), Duration::from_millis(2));
        assert_eq!(backoff_for(4), Duration::from_millis(8));
        assert_eq!(backoff_for(8), MAX_BACKOFF);
    }
}
