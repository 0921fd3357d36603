// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A stale-while-revalidate data store.
//!
//! Wrap an async fetch function in a [`Store`] and read through it: reads
//! return instantly from cache when possible, serve stale data while a
//! background fetch refreshes it, share one in-flight fetch per key, retry
//! failures with exponential backoff, and notify subscribers whenever a
//! cached value changes.
//!
//! # Freshness model
//!
//! Every cached value carries the timestamp of the request that produced it.
//! Relative to that timestamp a value is:
//!
//! - **fresh** (younger than `fresh_age`): returned as-is, no fetch;
//! - **stale** (younger than `fresh_age + stale_age`): returned synchronously
//!   *while a background fetch runs* — the defining stale-while-revalidate
//!   behavior;
//! - **expired**: a fetch starts and the read observes it as
//!   [`MutationResult::Pending`].
//!
//! A fetch that completes only writes back if no newer request has touched
//! the key in the meantime (request issuance order wins, not completion
//! order), and a refetch that returns structurally equal data is suppressed
//! so subscribers never see a redundant notification.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use freshet::{MutationResult, Store};
//! use tick::Clock;
//!
//! # async fn example() {
//! let clock = Clock::new_tokio();
//! let store = Store::builder(clock, |breed: String| async move {
//!     Ok::<_, std::io::Error>(format!("https://dog.ceo/{breed}"))
//! })
//! .fresh_age(Duration::from_secs(2))
//! .stale_age(Duration::from_secs(30))
//! .build();
//!
//! // Synchronous read; the fetch it starts runs in the background.
//! let result = store.get(&"shiba".to_string());
//! assert!(result.is_pending());
//!
//! // Awaiting the data is the only suspension point the store exposes.
//! let url = result.data().await.expect("fetch should succeed");
//! assert_eq!(url, "https://dog.ceo/shiba");
//! # }
//! ```
//!
//! # Subscriptions and triggers
//!
//! [`Store::subscribe`] registers a listener for a key's cache writes. The
//! first listener on a key lazily wires the key's revalidation triggers —
//! [`Store::trigger`] signals, an optional polling interval, and host
//! lifecycle events such as focus or connectivity changes — and the last
//! unsubscribe tears them down again. Host events reach the store through
//! the [`EventSource`] capability; hosts without lifecycle events use the
//! default [`NullEventSource`].
//!
//! # Errors
//!
//! Store operations never fail: a fetch failure after retry exhaustion is
//! cached as [`MutationResult::Failure`] and delivered to subscribers like
//! any other result, stable until the next successful revalidation.
//!
//! # Testing
//!
//! All time flows through [`tick::Clock`], so freshness windows, retry
//! backoff, and polling are deterministic under `tick`'s `ClockControl`. The
//! `test-util` feature additionally exposes [`StubEventSource`] for driving
//! host events by hand.

mod builder;
mod error;
mod events;
mod mutation;
mod refresh;
mod revalidation;
mod runtime;
mod store;

pub use builder::StoreBuilder;
pub use error::FetchError;
#[cfg(any(feature = "test-util", test))]
pub use events::StubEventSource;
pub use events::{EventSource, HostEvent, HostEventHandler, HostSubscription, NullEventSource};
pub use mutation::{Mutation, MutationResult, PendingData};
pub use store::{GetOptions, Store, Subscription};
