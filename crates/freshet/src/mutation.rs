// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The per-key mutation record and the observable cache that owns it.

use std::time::Instant;

use redo::Completion;
use watchmap::{Subscription, WatchMap};

use crate::error::FetchError;

/// The shared future behind a [`MutationResult::Pending`] value.
///
/// Every consumer that observes the same in-flight fetch holds a clone of the
/// same completion (that sharing is the per-key deduplication guarantee), and
/// awaiting it is the only suspension point the store ever exposes.
pub type PendingData<T> = Completion<Result<T, FetchError>>;

/// The observable outcome of fetching one key.
#[derive(Debug, Clone)]
pub enum MutationResult<T> {
    /// A fetch is in flight; the payload settles when it completes.
    Pending(PendingData<T>),
    /// The fetch produced a value.
    Success(T),
    /// The fetch failed after retry exhaustion, or the read could not be
    /// served (see [`FetchError::is_no_data`]).
    Failure(FetchError),
}

impl<T> MutationResult<T> {
    /// Returns `true` for a pending result.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Returns `true` for a success result.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns `true` for a failure result.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the success value, if any.
    #[must_use]
    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Pending(_) | Self::Failure(_) => None,
        }
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&FetchError> {
        match self {
            Self::Failure(error) => Some(error),
            Self::Pending(_) | Self::Success(_) => None,
        }
    }
}

impl<T: Clone> MutationResult<T> {
    /// Resolves the result to data: immediately for settled results, after the
    /// in-flight fetch completes for pending ones.
    ///
    /// This is the bridge adapters use to turn a pending result into a
    /// suspension.
    pub async fn data(&self) -> Result<T, FetchError> {
        match self {
            Self::Pending(completion) => completion.clone().await,
            Self::Success(data) => Ok(data.clone()),
            Self::Failure(error) => Err(error.clone()),
        }
    }
}

/// One key's cache record: the latest result plus freshness bookkeeping.
///
/// Mutations are replaced wholesale on every cache write; they are never
/// mutated in place once stored.
#[derive(Debug, Clone)]
pub struct Mutation<T> {
    /// The latest observed result for the key.
    pub result: MutationResult<T>,
    /// When the request that produced (or refreshed) this record was issued.
    /// Drives the freshness and staleness windows.
    pub timestamp: Instant,
    /// `true` while a revalidation fetch for this key is outstanding.
    pub is_validating: bool,
}

/// The typed, observable key-value store for [`Mutation`]s.
///
/// Pure storage: every freshness or deduplication decision lives in the store
/// engine, not here.
pub(crate) struct MutationCache<T> {
    map: WatchMap<String, Mutation<T>>,
}

impl<T: Clone> MutationCache<T> {
    pub(crate) fn new() -> Self {
        Self { map: WatchMap::new() }
    }

    pub(crate) fn mutation(&self, key: &str) -> Option<Mutation<T>> {
        self.map.get(key)
    }

    pub(crate) fn set_mutation(&self, key: &str, mutation: Mutation<T>) {
        self.map.set(&key.to_owned(), mutation);
    }

    pub(crate) fn set_mutation_silent(&self, key: &str, mutation: Mutation<T>) {
        self.map.set_silent(&key.to_owned(), mutation);
    }

    pub(crate) fn subscribe(
        &self,
        key: &str,
        listener: impl Fn(&Mutation<T>) + Send + Sync + 'static,
    ) -> Subscription<String, Mutation<T>> {
        self.map.subscribe(&key.to_owned(), listener)
    }

    pub(crate) fn listener_count(&self, key: &str) -> usize {
        self.map.listener_count(key)
    }
}

impl<T> std::fmt::Debug for MutationCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCache").finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn success_mutation(data: u32) -> Mutation<u32> {
        Mutation {
            result: MutationResult::Success(data),
            timestamp: Instant::now(),
            is_validating: false,
        }
    }

    #[test]
    fn result_accessors_match_variants() {
        let success: MutationResult<u32> = MutationResult::Success(3);
        assert!(success.is_success());
        assert_eq!(success.success(), Some(&3));
        assert!(success.failure().is_none());

        let failure: MutationResult<u32> = MutationResult::Failure(FetchError::new(std::io::Error::other("x")));
        assert!(failure.is_failure());
        assert!(failure.success().is_none());
        assert!(failure.failure().is_some());
    }

    #[test]
    fn data_resolves_settled_results_immediately() {
        let success: MutationResult<u32> = MutationResult::Success(9);
        assert_eq!(futures::executor::block_on(success.data()).expect("success should resolve"), 9);

        let failure: MutationResult<u32> = MutationResult::Failure(FetchError::new(std::io::Error::other("x")));
        assert!(futures::executor::block_on(failure.data()).is_err());
    }

    #[test]
    fn cache_stores_and_notifies() {
        let cache = MutationCache::new();
        let writes = Arc::new(AtomicUsize::new(0));

        assert!(cache.mutation("key").is_none());

        let _sub = cache.subscribe("key", {
            let writes = Arc::clone(&writes);
            move |_: &Mutation<u32>| {
                writes.fetch_add(1, Ordering::SeqCst);
            }
        });

        cache.set_mutation("key", success_mutation(1));
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(cache.mutation("key").expect("mutation should exist").result.success(), Some(&1));

        cache.set_mutation_silent("key", success_mutation(2));
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(cache.mutation("key").expect("mutation should exist").result.success(), Some(&2));
    }

    #[test]
    fn listener_count_delegates_to_the_map() {
        let cache: MutationCache<u32> = MutationCache::new();
        assert_eq!(cache.listener_count("key"), 0);

        let sub = cache.subscribe("key", |_| {});
        assert_eq!(cache.listener_count("key"), 1);

        sub.unsubscribe();
        assert_eq!(cache.listener_count("key"), 0);
    }
}
