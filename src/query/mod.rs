//! Query layer — declarative filter specs compiled to executable queries.
//!
//! - [`types`] — [`Query`], [`SortEntry`], [`SortDirection`].
//! - [`builder`] — [`restaurant_query`] / [`reviews_query`] (filter spec → query).
//! - [`operators`] — value comparison and equality matching.
//! - [`execute`] — scan-and-filter execution used by the in-memory store.

pub mod builder;
pub mod execute;
pub mod operators;
pub mod types;

pub use builder::{restaurant_query, reviews_query};
pub use execute::{execute_query, sort_documents};
pub use operators::{compare_values, get_field_value, matches_filter};
pub use types::{Query, SortDirection, SortEntry};
