//! Reactive layer — live snapshot subscriptions over a [`DocumentStore`].
//!
//! # Modules
//!
//! - [`event`] — [`ChangeEvent`] enum.
//! - [`event_emitter`] — generic typed pub/sub ([`EventEmitter<T>`]).
//! - [`watch`] — [`ReactiveStore<S>`] and the [`Subscription`] handle.
//!
//! [`DocumentStore`]: crate::store::traits::DocumentStore

pub mod event;
pub mod event_emitter;
pub mod watch;

pub use event::ChangeEvent;
pub use event_emitter::{EventEmitter, ListenerId};
pub use watch::{ReactiveStore, Subscription};
