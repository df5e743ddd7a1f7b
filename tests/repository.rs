//! Integration tests for `RestaurantRepository<MemoryStore>`.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use platedb::error::{PlatedbError, Result, StoreError};
use platedb::model::{NewRestaurant, NewReview, PriceTier, RestaurantFilter, SortBy};
use platedb::query::types::Query;
use platedb::repository::RestaurantRepository;
use platedb::store::memory::MemoryStore;
use platedb::store::traits::{
    CommitReceipt, DocumentStore, SequencedRead, VersionedDocument, WriteOp,
};

// ============================================================================
// Helpers
// ============================================================================

fn repo() -> RestaurantRepository<MemoryStore> {
    RestaurantRepository::new(MemoryStore::new())
}

fn seed(
    repo: &RestaurantRepository<MemoryStore>,
    name: &str,
    category: &str,
    city: &str,
    price: u8,
) -> String {
    repo.create_restaurant(NewRestaurant {
        name: name.to_string(),
        category: category.to_string(),
        city: city.to_string(),
        price: PriceTier::new(price).unwrap(),
        photo: String::new(),
    })
    .expect("create restaurant")
    .id
}

fn review(user_id: &str, rating: f64) -> NewReview {
    NewReview {
        user_id: user_id.to_string(),
        rating,
        text: String::new(),
    }
}

fn make_log<T: Send + 'static>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

// ============================================================================
// Fetch
// ============================================================================

#[test]
fn fetch_restaurants_applies_equality_filters() {
    let repo = repo();
    seed(&repo, "Taj", "Indian", "Oakland", 2);
    seed(&repo, "Sakura", "Sushi", "Oakland", 3);
    seed(&repo, "Bombay", "Indian", "Berkeley", 2);

    let filter = RestaurantFilter {
        category: Some("Indian".to_string()),
        city: Some("Oakland".to_string()),
        ..Default::default()
    };
    let results = repo.fetch_restaurants(&filter).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Taj");
}

#[test]
fn fetch_restaurants_price_filter_matches_ordinal() {
    let repo = repo();
    seed(&repo, "Cheap", "Indian", "Oakland", 1);
    seed(&repo, "Fancy", "Indian", "Oakland", 4);

    let filter = RestaurantFilter {
        price: Some(PriceTier::from_symbol("$$$$").unwrap()),
        ..Default::default()
    };
    let results = repo.fetch_restaurants(&filter).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Fancy");
}

#[test]
fn fetch_restaurants_default_sort_is_avg_rating_desc() {
    let repo = repo();
    let low = seed(&repo, "Low", "Indian", "Oakland", 2);
    let high = seed(&repo, "High", "Indian", "Oakland", 2);
    repo.add_review(&low, &review("u1", 2.0)).unwrap();
    repo.add_review(&high, &review("u2", 5.0)).unwrap();

    let results = repo.fetch_restaurants(&RestaurantFilter::default()).unwrap();
    assert_eq!(results[0].name, "High");
    assert_eq!(results[1].name, "Low");
}

#[test]
fn fetch_restaurants_review_sort_orders_by_count() {
    let repo = repo();
    let popular = seed(&repo, "Popular", "Indian", "Oakland", 2);
    let acclaimed = seed(&repo, "Acclaimed", "Indian", "Oakland", 2);
    // Acclaimed: one perfect review. Popular: two middling ones.
    repo.add_review(&acclaimed, &review("u1", 5.0)).unwrap();
    repo.add_review(&popular, &review("u2", 3.0)).unwrap();
    repo.add_review(&popular, &review("u3", 3.0)).unwrap();

    let by_reviews = repo
        .fetch_restaurants(&RestaurantFilter {
            sort: Some(SortBy::Review),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_reviews[0].name, "Popular");

    let by_rating = repo
        .fetch_restaurants(&RestaurantFilter {
            sort: Some(SortBy::Rating),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_rating[0].name, "Acclaimed");
}

#[test]
fn fetch_restaurant_by_id_and_not_found() {
    let repo = repo();
    let id = seed(&repo, "Taj", "Indian", "Oakland", 2);

    let found = repo.fetch_restaurant(&id).unwrap();
    assert_eq!(found.name, "Taj");
    assert_eq!(found.num_ratings, 0);
    assert_eq!(found.avg_rating, 0.0);

    let err = repo.fetch_restaurant("missing").unwrap_err();
    assert!(err.is_not_found());
}

// ============================================================================
// Reviews
// ============================================================================

#[test]
fn add_review_updates_aggregate_atomically() {
    let repo = repo();
    let id = seed(&repo, "Taj", "Indian", "Oakland", 2);

    repo.add_review(&id, &review("alice", 5.0)).unwrap();
    repo.add_review(&id, &review("bob", 4.0)).unwrap();

    let r = repo.fetch_restaurant(&id).unwrap();
    assert_eq!(r.num_ratings, 2);
    assert_eq!(r.sum_rating, 9.0);
    assert!((r.avg_rating - 4.5).abs() < 1e-9);
    assert_eq!(r.last_review_user_id.as_deref(), Some("bob"));
}

#[test]
fn add_review_returns_the_stored_review() {
    let repo = repo();
    let id = seed(&repo, "Taj", "Indian", "Oakland", 2);

    let stored = repo
        .add_review(
            &id,
            &NewReview {
                user_id: "alice".to_string(),
                rating: 4.0,
                text: "solid".to_string(),
            },
        )
        .unwrap();
    assert!(!stored.id.is_empty());
    assert_eq!(stored.restaurant_id, id);
    assert_eq!(stored.user_id, "alice");
    assert_eq!(stored.text, "solid");
}

#[test]
fn add_review_on_missing_restaurant_is_not_found() {
    let repo = repo();
    let err = repo.add_review("missing", &review("alice", 4.0)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn add_review_rejects_empty_user_id() {
    let repo = repo();
    let id = seed(&repo, "Taj", "Indian", "Oakland", 2);
    let err = repo.add_review(&id, &review("", 4.0)).unwrap_err();
    assert!(matches!(err, PlatedbError::Validation(_)));
}

#[test]
fn fetch_reviews_newest_first() {
    let repo = repo();
    let id = seed(&repo, "Taj", "Indian", "Oakland", 2);
    for (user, rating) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0), ("e", 5.0)] {
        repo.add_review(&id, &review(user, rating)).unwrap();
    }

    let reviews = repo.fetch_reviews(&id).unwrap();
    assert_eq!(reviews.len(), 5);
    assert_eq!(reviews[0].user_id, "e", "newest review first");
    for pair in reviews.windows(2) {
        assert!(
            pair[0].timestamp > pair[1].timestamp,
            "timestamps must be strictly non-increasing"
        );
    }
}

#[test]
fn fetch_reviews_rejects_empty_restaurant_id() {
    let repo = repo();
    let err = repo.fetch_reviews("").unwrap_err();
    assert!(matches!(err, PlatedbError::Validation(_)));
}

#[test]
fn reviews_are_scoped_to_their_restaurant() {
    let repo = repo();
    let a = seed(&repo, "A", "Indian", "Oakland", 2);
    let b = seed(&repo, "B", "Indian", "Oakland", 2);
    repo.add_review(&a, &review("u1", 5.0)).unwrap();
    repo.add_review(&b, &review("u2", 3.0)).unwrap();

    let reviews_a = repo.fetch_reviews(&a).unwrap();
    assert_eq!(reviews_a.len(), 1);
    assert_eq!(reviews_a[0].restaurant_id, a);
}

// ============================================================================
// Photo updates
// ============================================================================

#[test]
fn update_restaurant_photo_persists_url() {
    let repo = repo();
    let id = seed(&repo, "Taj", "Indian", "Oakland", 2);

    repo.update_restaurant_photo(&id, "https://img.example/taj.jpg")
        .unwrap();
    let r = repo.fetch_restaurant(&id).unwrap();
    assert_eq!(r.photo, "https://img.example/taj.jpg");
}

#[test]
fn update_restaurant_photo_missing_restaurant_is_not_found() {
    let repo = repo();
    let err = repo
        .update_restaurant_photo("missing", "https://img.example/x.jpg")
        .unwrap_err();
    assert!(err.is_not_found());
}

/// Store whose conditional updates always lose the version race.
struct ContendedStore {
    inner: MemoryStore,
}

impl DocumentStore for ContendedStore {
    fn get_sequenced(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<SequencedRead<Option<VersionedDocument>>> {
        self.inner.get_sequenced(collection, id)
    }

    fn query_sequenced(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<SequencedRead<Vec<Value>>> {
        self.inner.query_sequenced(collection, query)
    }

    fn commit(&self, ops: Vec<WriteOp>) -> Result<CommitReceipt> {
        for op in &ops {
            if let WriteOp::Update {
                collection,
                id,
                expected_version,
                ..
            } = op
            {
                return Err(StoreError::Conflict {
                    collection: collection.clone(),
                    id: id.clone(),
                    expected: *expected_version,
                    found: expected_version + 1,
                }
                .into());
            }
        }
        self.inner.commit(ops)
    }

    fn sequence(&self) -> u64 {
        self.inner.sequence()
    }
}

#[test]
fn exhausted_photo_update_surfaces_as_transaction_error() {
    let repo = RestaurantRepository::new(ContendedStore {
        inner: MemoryStore::new(),
    });
    let id = repo
        .create_restaurant(NewRestaurant {
            name: "Taj".to_string(),
            category: "Indian".to_string(),
            city: "Oakland".to_string(),
            price: PriceTier::new(2).unwrap(),
            photo: String::new(),
        })
        .unwrap()
        .id;

    let err = repo
        .update_restaurant_photo(&id, "https://img.example/taj.jpg")
        .unwrap_err();
    match err {
        PlatedbError::Transaction(t) => {
            assert!(t.attempts > 1, "retries must be exhausted first");
            assert_eq!(t.id, id);
        }
        other => panic!("expected a transaction error, got {other}"),
    }
}

// ============================================================================
// Live subscriptions
// ============================================================================

#[test]
fn watch_restaurants_redelivers_reordered_snapshot_after_boundary_cross() {
    let repo = repo();
    let a = seed(&repo, "A", "Indian", "Oakland", 2);
    let b = seed(&repo, "B", "Indian", "Oakland", 2);
    repo.add_review(&a, &review("u1", 4.0)).unwrap();

    let snapshots = make_log::<Vec<String>>();
    let snapshots_clone = Arc::clone(&snapshots);
    let _sub = repo.watch_restaurants(
        &RestaurantFilter::default(),
        move |restaurants| {
            snapshots_clone
                .lock()
                .unwrap()
                .push(restaurants.into_iter().map(|r| r.name).collect());
        },
        |e| panic!("unexpected subscription error: {e}"),
    );

    // B crosses the sort boundary: avg 0.0 → 5.0, overtaking A's 4.0.
    repo.add_review(&b, &review("u2", 5.0)).unwrap();

    let snapshots = snapshots.lock().unwrap();
    assert_eq!(snapshots[0], vec!["A".to_string(), "B".to_string()]);
    assert_eq!(
        snapshots.last().unwrap(),
        &vec!["B".to_string(), "A".to_string()]
    );
}

#[test]
fn watch_reviews_matches_one_shot_ordering() {
    let repo = repo();
    let id = seed(&repo, "Taj", "Indian", "Oakland", 2);
    repo.add_review(&id, &review("first", 3.0)).unwrap();

    let snapshots = make_log::<Vec<String>>();
    let snapshots_clone = Arc::clone(&snapshots);
    let _sub = repo.watch_reviews(
        &id,
        move |reviews| {
            snapshots_clone
                .lock()
                .unwrap()
                .push(reviews.into_iter().map(|r| r.user_id).collect());
        },
        |e| panic!("unexpected subscription error: {e}"),
    );

    repo.add_review(&id, &review("second", 5.0)).unwrap();

    let fetched: Vec<String> = repo
        .fetch_reviews(&id)
        .unwrap()
        .into_iter()
        .map(|r| r.user_id)
        .collect();
    let snapshots = snapshots.lock().unwrap();
    assert_eq!(snapshots.last().unwrap(), &fetched);
    assert_eq!(fetched, vec!["second".to_string(), "first".to_string()]);
}

#[test]
fn watch_restaurant_delivers_document_updates() {
    let repo = repo();
    let id = seed(&repo, "Taj", "Indian", "Oakland", 2);

    let snapshots = make_log::<Option<u64>>();
    let snapshots_clone = Arc::clone(&snapshots);
    let _sub = repo.watch_restaurant(
        &id,
        move |restaurant| {
            snapshots_clone
                .lock()
                .unwrap()
                .push(restaurant.map(|r| r.num_ratings));
        },
        |e| panic!("unexpected subscription error: {e}"),
    );

    repo.add_review(&id, &review("u1", 4.0)).unwrap();

    let snapshots = snapshots.lock().unwrap();
    assert_eq!(snapshots.first().unwrap(), &Some(0));
    assert_eq!(snapshots.last().unwrap(), &Some(1));
}

#[test]
fn unsubscribe_twice_is_a_no_op() {
    let repo = repo();
    let snapshots = make_log::<usize>();
    let snapshots_clone = Arc::clone(&snapshots);
    let sub = repo.watch_restaurants(
        &RestaurantFilter::default(),
        move |restaurants| snapshots_clone.lock().unwrap().push(restaurants.len()),
        |_| {},
    );

    sub.unsubscribe();
    sub.unsubscribe();

    seed(&repo, "Taj", "Indian", "Oakland", 2);
    assert_eq!(snapshots.lock().unwrap().as_slice(), &[0]);
}
