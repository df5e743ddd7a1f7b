//! platedb — restaurant aggregation and live query engine.
//!
//! Composes dynamic filter/sort queries over a restaurant collection,
//! maintains the derived rating aggregate under concurrent review
//! submissions with conditional-write atomicity, and delivers full-snapshot
//! live updates to subscribers when underlying data changes. The document
//! store is an injected capability ([`store::traits::DocumentStore`]); an
//! in-memory versioned implementation ships in [`store::memory`].

pub mod aggregate;
pub mod error;
pub mod model;
pub mod query;
pub mod reactive;
pub mod repository;
pub mod store;
