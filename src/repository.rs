//! RestaurantRepository — the public surface combining the query builder,
//! the aggregate transaction engine, and the snapshot subscription manager.
//!
//! Every operation exists in a one-shot and a live (`watch_*`) variant, both
//! built from the same query so the two views can never disagree on filters
//! or ordering. Entities handed to callers always carry normalized
//! `DateTime<Utc>` timestamps; errors from the layers below propagate
//! unmodified.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::aggregate::{self, MAX_COMMIT_ATTEMPTS};
use crate::error::{
    PlatedbError, Result, StoreError, SubscriptionError, TransactionError, ValidationError,
};
use crate::model::{
    reviews_collection, NewRestaurant, NewReview, Restaurant, RestaurantFilter, Review,
    RESTAURANTS,
};
use crate::query::builder::{restaurant_query, reviews_query};
use crate::reactive::watch::{ReactiveStore, Subscription};
use crate::store::traits::{DocumentStore, WriteOp};

type ErrorCallback = Arc<dyn Fn(SubscriptionError) + Send + Sync>;

/// The repository facade. Owns a [`ReactiveStore`] wrapped around the
/// injected document store; there is no global store handle.
pub struct RestaurantRepository<S: DocumentStore> {
    store: Arc<ReactiveStore<S>>,
}

impl<S: DocumentStore> RestaurantRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(ReactiveStore::new(store)),
        }
    }

    /// The underlying reactive store, for raw change-event listeners.
    pub fn store(&self) -> &ReactiveStore<S> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Restaurants
    // -----------------------------------------------------------------------

    /// One-shot fetch of restaurants matching `filter`, in query order.
    pub fn fetch_restaurants(&self, filter: &RestaurantFilter) -> Result<Vec<Restaurant>> {
        let query = restaurant_query(filter);
        let documents = self.store.query(RESTAURANTS, &query)?;
        decode_all(RESTAURANTS, documents)
    }

    /// Live variant of [`fetch_restaurants`]: delivers the full current
    /// result set immediately and after every relevant change.
    ///
    /// [`fetch_restaurants`]: RestaurantRepository::fetch_restaurants
    pub fn watch_restaurants(
        &self,
        filter: &RestaurantFilter,
        on_change: impl Fn(Vec<Restaurant>) + Send + Sync + 'static,
        on_error: impl Fn(SubscriptionError) + Send + Sync + 'static,
    ) -> Subscription {
        let query = restaurant_query(filter);
        let on_error: ErrorCallback = Arc::new(on_error);
        let decode_errors = Arc::clone(&on_error);
        self.store.watch_query(
            RESTAURANTS,
            query,
            move |documents| match decode_all::<Restaurant>(RESTAURANTS, documents) {
                Ok(restaurants) => on_change(restaurants),
                Err(e) => decode_errors(SubscriptionError {
                    collection: RESTAURANTS.to_string(),
                    source: Box::new(e),
                }),
            },
            Some(on_error),
        )
    }

    /// Fetch one restaurant by id. `NotFound` if it does not exist.
    pub fn fetch_restaurant(&self, id: &str) -> Result<Restaurant> {
        require_id("restaurantId", id)?;
        let doc = self
            .store
            .get(RESTAURANTS, id)?
            .ok_or_else(|| StoreError::NotFound {
                collection: RESTAURANTS.to_string(),
                id: id.to_string(),
            })?;
        decode(RESTAURANTS, id, doc.data)
    }

    /// Live variant of [`fetch_restaurant`]. The callback receives `None`
    /// while the restaurant does not exist.
    ///
    /// [`fetch_restaurant`]: RestaurantRepository::fetch_restaurant
    pub fn watch_restaurant(
        &self,
        id: &str,
        on_change: impl Fn(Option<Restaurant>) + Send + Sync + 'static,
        on_error: impl Fn(SubscriptionError) + Send + Sync + 'static,
    ) -> Subscription {
        let on_error: ErrorCallback = Arc::new(on_error);
        let decode_errors = Arc::clone(&on_error);
        let document_id = id.to_string();
        self.store.watch_document(
            RESTAURANTS,
            id,
            move |data| match data {
                None => on_change(None),
                Some(data) => match decode::<Restaurant>(RESTAURANTS, &document_id, data) {
                    Ok(restaurant) => on_change(Some(restaurant)),
                    Err(e) => decode_errors(SubscriptionError {
                        collection: RESTAURANTS.to_string(),
                        source: Box::new(e),
                    }),
                },
            },
            Some(on_error),
        )
    }

    /// Create a restaurant with a zeroed aggregate. The store assigns the id
    /// and creation timestamp.
    pub fn create_restaurant(&self, new: NewRestaurant) -> Result<Restaurant> {
        let mut data = serde_json::to_value(&new).map_err(|e| StoreError::Corrupt {
            collection: RESTAURANTS.to_string(),
            id: String::new(),
            source: Box::new(e),
        })?;
        if let Some(obj) = data.as_object_mut() {
            obj.insert("numRatings".to_string(), Value::from(0u64));
            obj.insert("sumRating".to_string(), Value::from(0.0));
            obj.insert("avgRating".to_string(), Value::from(0.0));
        }
        let written = self.store.insert(RESTAURANTS, data)?;
        decode(RESTAURANTS, &written.id, written.data)
    }

    /// Persist a new photo URL on a restaurant. Only the reference is
    /// stored; the image itself lives in external storage.
    pub fn update_restaurant_photo(&self, id: &str, photo_url: &str) -> Result<()> {
        require_id("restaurantId", id)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let doc = self
                .store
                .get(RESTAURANTS, id)?
                .ok_or_else(|| StoreError::NotFound {
                    collection: RESTAURANTS.to_string(),
                    id: id.to_string(),
                })?;
            let mut data = doc.data.clone();
            if let Some(obj) = data.as_object_mut() {
                obj.insert("photo".to_string(), Value::from(photo_url));
            }
            match self.store.commit(vec![WriteOp::Update {
                collection: RESTAURANTS.to_string(),
                id: id.to_string(),
                data,
                expected_version: doc.version,
            }]) {
                Ok(_) => return Ok(()),
                Err(PlatedbError::Store(conflict @ StoreError::Conflict { .. })) => {
                    if attempt >= MAX_COMMIT_ATTEMPTS {
                        return Err(TransactionError {
                            collection: RESTAURANTS.to_string(),
                            id: id.to_string(),
                            attempts: attempt,
                            source: conflict,
                        }
                        .into());
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reviews
    // -----------------------------------------------------------------------

    /// One-shot fetch of a restaurant's reviews, newest first.
    pub fn fetch_reviews(&self, restaurant_id: &str) -> Result<Vec<Review>> {
        require_id("restaurantId", restaurant_id)?;
        let collection = reviews_collection(restaurant_id);
        let documents = self.store.query(&collection, &reviews_query())?;
        decode_all(&collection, documents)
    }

    /// Live variant of [`fetch_reviews`], same newest-first ordering.
    ///
    /// [`fetch_reviews`]: RestaurantRepository::fetch_reviews
    pub fn watch_reviews(
        &self,
        restaurant_id: &str,
        on_change: impl Fn(Vec<Review>) + Send + Sync + 'static,
        on_error: impl Fn(SubscriptionError) + Send + Sync + 'static,
    ) -> Subscription {
        let collection = reviews_collection(restaurant_id);
        let on_error: ErrorCallback = Arc::new(on_error);
        let decode_errors = Arc::clone(&on_error);
        let decode_collection = collection.clone();
        self.store.watch_query(
            collection,
            reviews_query(),
            move |documents| match decode_all::<Review>(&decode_collection, documents) {
                Ok(reviews) => on_change(reviews),
                Err(e) => decode_errors(SubscriptionError {
                    collection: decode_collection.clone(),
                    source: Box::new(e),
                }),
            },
            Some(on_error),
        )
    }

    /// Submit a review through the aggregate transaction engine (§ atomic
    /// aggregate update + review insert).
    pub fn add_review(&self, restaurant_id: &str, review: &NewReview) -> Result<Review> {
        aggregate::submit_review(self.store.as_ref(), restaurant_id, review)
    }
}

// ============================================================================
// Decoding helpers
// ============================================================================

fn require_id(field: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ValidationError::new(field, "must not be empty").into());
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(collection: &str, id: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| {
        StoreError::Corrupt {
            collection: collection.to_string(),
            id: id.to_string(),
            source: Box::new(e),
        }
        .into()
    })
}

fn decode_all<T: DeserializeOwned>(collection: &str, documents: Vec<Value>) -> Result<Vec<T>> {
    documents
        .into_iter()
        .map(|doc| {
            let id = doc
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            decode(collection, &id, doc)
        })
        .collect()
}
