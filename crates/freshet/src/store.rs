// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The store engine: freshness policy, fetch deduplication, supersession,
//! and lazy trigger wiring.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use redo::{RetryHandle, RetryOptions};
use serde::Serialize;
use tick::Clock;

use crate::{
    builder::StoreBuilder,
    error::FetchError,
    events::{EventSource, HostEvent, HostEventHandler},
    mutation::{Mutation, MutationCache, MutationResult, PendingData},
    refresh::{self, RefreshPolicy},
    revalidation::RevalidationBus,
    runtime::Runtime,
};

pub(crate) type FetchFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;
pub(crate) type KeyFn<A> = Arc<dyn Fn(&A) -> String + Send + Sync>;
pub(crate) type CompareFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

type Cleanup = Box<dyn FnOnce() + Send>;

/// The resolved configuration of a store.
pub(crate) struct StoreOptions<A, T> {
    pub name: &'static str,
    pub fetch: FetchFn<A, T>,
    pub key: KeyFn<A>,
    pub compare: CompareFn<T>,
    pub initial_data: Option<T>,
    pub fresh_age: Duration,
    pub stale_age: Duration,
    pub max_retry_count: u32,
    pub max_retry_interval: Duration,
    pub revalidate_on_focus: bool,
    pub revalidate_on_network: bool,
    pub revalidate_on_visibility: bool,
    pub refresh: RefreshPolicy,
    pub events: Arc<dyn EventSource>,
}

/// Per-call options for [`Store::get_with`].
#[derive(Debug, Clone)]
pub struct GetOptions<T> {
    /// When `false`, never start a fetch: return whatever is cached, or a
    /// [`no-data failure`](FetchError::is_no_data) when nothing is cached and
    /// no initial data is configured. Defaults to `true`.
    pub should_revalidate: bool,
    /// Hydrates the key with this value if no mutation exists yet, taking
    /// precedence over the store-level initial data.
    pub initial_data: Option<T>,
    /// When hydrating, also persist the synthesized mutation into the cache
    /// (notifying subscribers) instead of only returning it. Defaults to
    /// `false`.
    pub hydrate: bool,
}

impl<T> Default for GetOptions<T> {
    fn default() -> Self {
        Self {
            should_revalidate: true,
            initial_data: None,
            hydrate: false,
        }
    }
}

/// A stale-while-revalidate data store over an async fetch function.
///
/// See the [crate documentation](crate) for the freshness model and a full
/// example. Clones are cheap and share the same underlying caches.
pub struct Store<A, T> {
    inner: Arc<StoreInner<A, T>>,
}

impl<A, T> Clone for Store<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> fmt::Debug for Store<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("name", &self.inner.options.name).finish_non_exhaustive()
    }
}

pub(crate) struct StoreInner<A, T> {
    options: StoreOptions<A, T>,
    runtime: Runtime,
    mutations: MutationCache<T>,
    revalidations: RevalidationBus,
    /// The latest retry handle per key; at most one is live at any instant.
    retries: Mutex<HashMap<String, RetryHandle<T, FetchError>>>,
    /// Per-key teardown stacks for the lazily wired revalidation triggers.
    cleanups: Mutex<HashMap<String, Vec<Cleanup>>>,
}

impl<A, T> Store<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates a builder around `fetch`, the async operation this store
    /// caches.
    ///
    /// The default key function serializes the arguments with `serde_json`
    /// and the default comparison is `PartialEq`; both can be replaced on the
    /// builder.
    ///
    /// # Panics
    ///
    /// Reads panic if the default key function is kept and the arguments fail
    /// to serialize; supply [`StoreBuilder::key`] for argument types without
    /// a total serialization.
    pub fn builder<F, Fut, E>(clock: Clock, fetch: F) -> StoreBuilder<A, T>
    where
        A: Serialize,
        T: PartialEq,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let fetch: FetchFn<A, T> = Arc::new(move |args| {
            let fut = fetch(args);
            async move { fut.await.map_err(FetchError::new) }.boxed()
        });
        let key: KeyFn<A> = Arc::new(|args| serde_json::to_string(args).expect("store arguments should serialize as a cache key"));
        let compare: CompareFn<T> = Arc::new(|a, b| a == b);

        StoreBuilder::new(clock, fetch, key, compare)
    }

    pub(crate) fn from_options(options: StoreOptions<A, T>, runtime: Runtime) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                options,
                runtime,
                mutations: MutationCache::new(),
                revalidations: RevalidationBus::new(),
                retries: Mutex::new(HashMap::new()),
                cleanups: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the name used to identify this store in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.options.name
    }

    /// Returns a reference to the store's clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        self.inner.runtime.clock()
    }

    /// Reads the current result for `args`, revalidating if it is due.
    ///
    /// Returns synchronously in every case; the only effect a read can have
    /// is starting a background fetch. Equivalent to [`get_with`][Self::get_with]
    /// with default options.
    ///
    /// A read that starts a fetch spawns it on the ambient Tokio runtime, so
    /// it must be called within a runtime context.
    pub fn get(&self, args: &A) -> MutationResult<T> {
        self.get_with(args, GetOptions::default())
    }

    /// Reads the current result for `args` with explicit per-call options.
    ///
    /// The freshness policy, relative to the cached mutation's timestamp:
    ///
    /// - nothing cached: start a fetch, return [`MutationResult::Pending`];
    /// - fresh (younger than `fresh_age`): return the cached result, no
    ///   fetch;
    /// - stale (younger than `fresh_age + stale_age`): return the cached
    ///   result synchronously *and* start a background fetch, resetting the
    ///   freshness window;
    /// - expired: start a fetch and return the new pending result.
    ///
    /// A pending result that is still fresh is returned as-is, so concurrent
    /// readers share one in-flight fetch.
    pub fn get_with(&self, args: &A, options: GetOptions<T>) -> MutationResult<T> {
        self.inner.revalidate(args, &options)
    }

    /// Requests revalidation of `args` for its subscribers.
    ///
    /// This only signals: the actual fetch happens through the revalidation
    /// listener that subscribing wires up. A key with no subscribers records
    /// the signal and nothing else.
    pub fn trigger(&self, args: &A) {
        self.trigger_with(args, true);
    }

    /// Like [`trigger`][Self::trigger], with an explicit `should_revalidate`
    /// flag to propagate to the revalidation listeners.
    pub fn trigger_with(&self, args: &A, should_revalidate: bool) {
        self.inner.trigger(args, should_revalidate);
    }

    /// Writes `result` directly into the cache (an optimistic or external
    /// update), then requests revalidation.
    ///
    /// A success result that compares structurally equal to the cached
    /// success value skips the write — and its notification — but still
    /// signals revalidation.
    pub fn mutate(&self, args: &A, result: MutationResult<T>) {
        self.inner.mutate(args, result, true, self.inner.options.compare.as_ref());
    }

    /// Like [`mutate`][Self::mutate], with an explicit `should_revalidate`
    /// flag and a one-off comparison predicate.
    pub fn mutate_with(&self, args: &A, result: MutationResult<T>, should_revalidate: bool, compare: impl Fn(&T, &T) -> bool) {
        self.inner.mutate(args, result, should_revalidate, &compare);
    }

    /// Registers `listener` for every cache write to the key of `args`.
    ///
    /// The first listener on a key lazily wires the key's external
    /// revalidation triggers: the revalidation-bus listener that makes
    /// [`trigger`][Self::trigger] cause work, the polling loop when a refresh
    /// interval is configured, and the host event subscriptions for the
    /// `revalidate_on_*` options. When the last listener unsubscribes, all of
    /// that wiring is torn down exactly once.
    pub fn subscribe(&self, args: &A, listener: impl Fn(&Mutation<T>) + Send + Sync + 'static) -> Subscription {
        let key = self.inner.key_of(args);
        self.inner.lazy_register(&key, args);
        let sub = self.inner.mutations.subscribe(&key, listener);

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            sub.unsubscribe();
            if let Some(inner) = weak.upgrade() {
                inner.lazy_unregister(&key);
            }
        })
    }
}

impl<A, T> StoreInner<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn key_of(&self, args: &A) -> String {
        (self.options.key)(args)
    }

    fn revalidate(self: &Arc<Self>, args: &A, options: &GetOptions<T>) -> MutationResult<T> {
        let key = self.key_of(args);
        let now = self.runtime.clock().instant();

        let mut current = self.mutations.mutation(&key);
        let mut in_cache = current.is_some();

        // Hydrate a first read from initial data when configured.
        if current.is_none() {
            let initial = options.initial_data.clone().or_else(|| self.options.initial_data.clone());
            if let Some(data) = initial {
                let hydrated = Mutation {
                    result: MutationResult::Success(data),
                    timestamp: now,
                    is_validating: false,
                };
                if options.hydrate {
                    self.mutations.set_mutation(&key, hydrated.clone());
                    in_cache = true;
                }
                current = Some(hydrated);
            }
        }

        if let Some(mutation) = &current {
            if !options.should_revalidate {
                return mutation.result.clone();
            }
            if now.saturating_duration_since(mutation.timestamp) < self.options.fresh_age {
                return mutation.result.clone();
            }
            // An in-flight fetch that has outlived the fresh window no longer
            // represents the latest requester's intent; stop its retry
            // schedule before dispatching a replacement.
            if mutation.result.is_pending() {
                let retries = self.retries.lock();
                if let Some(previous) = retries.get(&key) {
                    previous.cancel();
                }
            }
        } else if !options.should_revalidate {
            return MutationResult::Failure(FetchError::no_data());
        }

        let pending = self.dispatch_fetch(&key, args, now);

        if let Some(mutation) = current {
            if now.saturating_duration_since(mutation.timestamp) < self.options.fresh_age + self.options.stale_age {
                // Stale window: serve the cached result synchronously while
                // the fetch runs. Refreshing the timestamp resets the
                // freshness window; the write is silent because the
                // observable result is unchanged.
                let refreshed = Mutation {
                    result: mutation.result,
                    timestamp: now,
                    is_validating: true,
                };
                let result = refreshed.result.clone();
                if in_cache {
                    self.mutations.set_mutation_silent(&key, refreshed);
                }
                return result;
            }
        }

        let result = MutationResult::Pending(pending);
        self.mutations.set_mutation(
            &key,
            Mutation {
                result: result.clone(),
                timestamp: now,
                is_validating: true,
            },
        );
        result
    }

    fn dispatch_fetch(self: &Arc<Self>, key: &str, args: &A, dispatched_at: Instant) -> PendingData<T> {
        #[cfg(feature = "logs")]
        tracing::debug!(store = self.options.name, key, "dispatching fetch");

        let supplier = {
            let fetch = Arc::clone(&self.options.fetch);
            let args = args.clone();
            move || fetch(args.clone())
        };
        let retry_options = RetryOptions {
            count: self.options.max_retry_count,
            interval: self.options.max_retry_interval,
        };
        let task = redo::retry(self.runtime.clock(), retry_options, supplier);
        let handle = task.handle();

        {
            let mut retries = self.retries.lock();
            retries.insert(key.to_owned(), handle.clone());
        }

        let weak = Arc::downgrade(self);
        let key = key.to_owned();
        self.runtime.spawn(async move {
            let outcome = task.await;
            let Some(inner) = weak.upgrade() else { return };
            match outcome {
                Ok(data) => inner.record_success(&key, dispatched_at, data),
                Err(error) => inner.record_failure(&key, dispatched_at, error),
            }
        });

        handle.completion()
    }

    /// Applies the supersession and equality guards before writing a fetched
    /// value back into the cache.
    fn record_success(&self, key: &str, dispatched_at: Instant, data: T) {
        let current = self.mutations.mutation(key);

        let should_write = match &current {
            None => true,
            // A strictly newer request owns this key now; keep its state.
            Some(mutation) if mutation.timestamp > dispatched_at => false,
            // Unchanged data would only produce a redundant notification.
            Some(mutation) => mutation.result.success().is_none_or(|existing| !(self.options.compare)(existing, &data)),
        };

        if !should_write {
            #[cfg(feature = "logs")]
            tracing::trace!(store = self.options.name, key, "discarding fetched value (superseded or unchanged)");
            return;
        }

        let timestamp = current.map_or_else(|| self.runtime.clock().instant(), |mutation| mutation.timestamp);
        self.mutations.set_mutation(
            key,
            Mutation {
                result: MutationResult::Success(data),
                timestamp,
                is_validating: false,
            },
        );
    }

    /// Failures notify unconditionally, but the supersession guard still
    /// applies.
    fn record_failure(&self, key: &str, dispatched_at: Instant, error: FetchError) {
        let current = self.mutations.mutation(key);

        if let Some(mutation) = &current {
            if mutation.timestamp > dispatched_at {
                #[cfg(feature = "logs")]
                tracing::trace!(store = self.options.name, key, "discarding fetch failure (superseded)");
                return;
            }
        }

        let timestamp = current.map_or_else(|| self.runtime.clock().instant(), |mutation| mutation.timestamp);
        self.mutations.set_mutation(
            key,
            Mutation {
                result: MutationResult::Failure(error),
                timestamp,
                is_validating: false,
            },
        );
    }

    fn trigger(&self, args: &A, should_revalidate: bool) {
        let key = self.key_of(args);
        self.revalidations.trigger(&key, should_revalidate);
    }

    fn mutate(&self, args: &A, result: MutationResult<T>, should_revalidate: bool, compare: &dyn Fn(&T, &T) -> bool) {
        let key = self.key_of(args);

        let unchanged = match (&self.mutations.mutation(&key), &result) {
            (Some(mutation), MutationResult::Success(data)) => mutation.result.success().is_some_and(|existing| compare(existing, data)),
            _ => false,
        };

        if !unchanged {
            self.mutations.set_mutation(
                &key,
                Mutation {
                    result,
                    timestamp: self.runtime.clock().instant(),
                    is_validating: false,
                },
            );
        }

        self.revalidations.trigger(&key, should_revalidate);
    }

    /// Wires the key's external revalidation triggers if this is the first
    /// listener.
    ///
    /// Holding the cleanups lock across the wiring keeps concurrent first
    /// subscribers from wiring twice; none of the wiring calls back into the
    /// store.
    fn lazy_register(self: &Arc<Self>, key: &str, args: &A) {
        let mut cleanups = self.cleanups.lock();
        if self.mutations.listener_count(key) > 0 || cleanups.contains_key(key) {
            return;
        }

        #[cfg(feature = "logs")]
        tracing::debug!(store = self.options.name, key, "wiring revalidation triggers");

        let mut stack: Vec<Cleanup> = Vec::new();

        // The listener that makes `trigger` cause work: revalidation signals
        // become revalidation calls carrying the signaled flag.
        {
            let weak = Arc::downgrade(self);
            let args = args.clone();
            let sub = self.revalidations.subscribe(key, move |flag: &bool| {
                if let Some(inner) = weak.upgrade() {
                    let options = GetOptions {
                        should_revalidate: *flag,
                        ..GetOptions::default()
                    };
                    drop(inner.revalidate(&args, &options));
                }
            });
            stack.push(Box::new(move || sub.unsubscribe()));
        }

        if let Some(interval) = self.options.refresh.interval {
            // Each enabled modifier runs its own gated polling loop; the gate
            // opens on one host event and closes on its counterpart.
            for (enabled, open, close) in self.options.refresh.gates() {
                if !enabled {
                    continue;
                }
                let gate = Arc::new(AtomicBool::new(false));

                let open_sub = self.options.events.subscribe(open, {
                    let gate = Arc::clone(&gate);
                    Arc::new(move || gate.store(true, Ordering::Release))
                });
                let close_sub = self.options.events.subscribe(close, {
                    let gate = Arc::clone(&gate);
                    Arc::new(move || gate.store(false, Ordering::Release))
                });

                let on_tick = self.signal_revalidation(key);
                let poll = refresh::spawn_polling(&self.runtime, interval, gate, move || on_tick());

                stack.push(Box::new(move || open_sub.unsubscribe()));
                stack.push(Box::new(move || close_sub.unsubscribe()));
                stack.push(Box::new(move || poll.abort()));
            }

            if !self.options.refresh.is_gated() {
                let gate = Arc::new(AtomicBool::new(true));
                let on_tick = self.signal_revalidation(key);
                let poll = refresh::spawn_polling(&self.runtime, interval, gate, move || on_tick());
                stack.push(Box::new(move || poll.abort()));
            }
        }

        for (enabled, event) in [
            (self.options.revalidate_on_focus, HostEvent::Focus),
            (self.options.revalidate_on_network, HostEvent::Online),
            (self.options.revalidate_on_visibility, HostEvent::Visible),
        ] {
            if !enabled {
                continue;
            }
            let sub = self.options.events.subscribe(event, self.signal_revalidation(key));
            stack.push(Box::new(move || sub.unsubscribe()));
        }

        cleanups.insert(key.to_owned(), stack);
    }

    /// Tears the key's trigger wiring down once the last listener is gone.
    fn lazy_unregister(&self, key: &str) {
        if self.mutations.listener_count(key) > 0 {
            return;
        }

        let stack = self.cleanups.lock().remove(key);
        if let Some(stack) = stack {
            #[cfg(feature = "logs")]
            tracing::debug!(store = self.options.name, key, "tearing down revalidation triggers");

            for cleanup in stack {
                cleanup();
            }
        }
    }

    /// A handler that raises the key's revalidation signal, holding the store
    /// weakly so wiring never keeps it alive.
    fn signal_revalidation(self: &Arc<Self>, key: &str) -> HostEventHandler {
        let weak = Arc::downgrade(self);
        let key = key.to_owned();
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.revalidations.trigger(&key, true);
            }
        })
    }
}

/// Detaches a [`Store::subscribe`] listener when dropped or explicitly
/// unsubscribed.
///
/// When the listener was the key's last, the key's trigger wiring is torn
/// down as part of the same teardown.
#[must_use = "dropping a subscription immediately removes its listener"]
pub struct Subscription {
    teardown: Option<Cleanup>,
}

impl Subscription {
    fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Removes the listener. Dropping the subscription has the same effect.
    pub fn unsubscribe(mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    use tick::ClockControl;

    use crate::events::StubEventSource;

    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Store<String, String>: Send, Sync, Clone, std::fmt::Debug);
        static_assertions::assert_impl_all!(Subscription: Send);
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    struct Fixture {
        store: Store<String, String>,
        events: Arc<StubEventSource>,
        attempts: Arc<AtomicUsize>,
    }

    fn fixture(control: &ClockControl, configure: impl FnOnce(StoreBuilder<String, String>) -> StoreBuilder<String, String>) -> Fixture {
        let events = Arc::new(StubEventSource::new());
        let attempts = Arc::new(AtomicUsize::new(0));

        let builder = Store::builder(control.to_clock(), {
            let attempts = Arc::clone(&attempts);
            move |args: String| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, std::io::Error>(args) }
            }
        })
        .event_source(Arc::clone(&events) as Arc<dyn EventSource>);

        Fixture {
            store: configure(builder).build(),
            events,
            attempts,
        }
    }

    #[test]
    fn first_subscriber_wires_each_trigger_source_exactly_once() {
        let control = ClockControl::new();
        let fixture = fixture(&control, |builder| {
            builder.revalidate_on_focus(true).revalidate_on_network(true).revalidate_on_visibility(true)
        });
        let store = &fixture.store;
        let args = "key".to_string();
        let key = store.inner.key_of(&args);

        let first = store.subscribe(&args, |_| {});
        let second = store.subscribe(&args, |_| {});

        assert_eq!(store.inner.mutations.listener_count(&key), 2);
        assert_eq!(store.inner.revalidations.listener_count(&key), 1);
        assert_eq!(fixture.events.handler_count(HostEvent::Focus), 1);
        assert_eq!(fixture.events.handler_count(HostEvent::Online), 1);
        assert_eq!(fixture.events.handler_count(HostEvent::Visible), 1);

        // Dropping one listener leaves the shared wiring intact.
        drop(first);
        assert_eq!(store.inner.mutations.listener_count(&key), 1);
        assert_eq!(store.inner.revalidations.listener_count(&key), 1);
        assert_eq!(fixture.events.handler_count(HostEvent::Focus), 1);

        // Dropping the last one tears everything down.
        drop(second);
        assert_eq!(store.inner.mutations.listener_count(&key), 0);
        assert_eq!(store.inner.revalidations.listener_count(&key), 0);
        assert_eq!(fixture.events.handler_count(HostEvent::Focus), 0);
        assert_eq!(fixture.events.handler_count(HostEvent::Online), 0);
        assert_eq!(fixture.events.handler_count(HostEvent::Visible), 0);
        assert!(store.inner.cleanups.lock().is_empty());
    }

    #[test]
    fn rewiring_after_full_teardown_works() {
        let control = ClockControl::new();
        let fixture = fixture(&control, |builder| builder.revalidate_on_focus(true));
        let args = "key".to_string();

        let sub = fixture.store.subscribe(&args, |_| {});
        assert_eq!(fixture.events.handler_count(HostEvent::Focus), 1);
        sub.unsubscribe();
        assert_eq!(fixture.events.handler_count(HostEvent::Focus), 0);

        let _sub = fixture.store.subscribe(&args, |_| {});
        assert_eq!(fixture.events.handler_count(HostEvent::Focus), 1);
    }

    #[test]
    fn wiring_is_per_key() {
        let control = ClockControl::new();
        let fixture = fixture(&control, |builder| builder.revalidate_on_focus(true));

        let _a = fixture.store.subscribe(&"a".to_string(), |_| {});
        let _b = fixture.store.subscribe(&"b".to_string(), |_| {});

        assert_eq!(fixture.events.handler_count(HostEvent::Focus), 2);
    }

    #[tokio::test]
    async fn focus_event_revalidates_subscribed_keys() {
        let control = ClockControl::new();
        let fixture = fixture(&control, |builder| builder.revalidate_on_focus(true));
        let args = "key".to_string();

        let _sub = fixture.store.subscribe(&args, |_| {});
        assert_eq!(fixture.attempts.load(Ordering::SeqCst), 0);

        fixture.events.emit(HostEvent::Focus);
        settle().await;

        assert_eq!(fixture.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfigured_events_are_ignored() {
        let control = ClockControl::new();
        let fixture = fixture(&control, |builder| builder.revalidate_on_focus(true));
        let args = "key".to_string();

        let _sub = fixture.store.subscribe(&args, |_| {});
        fixture.events.emit(HostEvent::Online);
        fixture.events.emit(HostEvent::Visible);
        settle().await;

        assert_eq!(fixture.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn polling_revalidates_every_interval_until_teardown() {
        let control = ClockControl::new();
        let fixture = fixture(&control, |builder| {
            builder
                .fresh_age(Duration::ZERO)
                .stale_age(Duration::ZERO)
                .refresh_interval(Duration::from_millis(100))
        });
        let args = "key".to_string();

        let sub = fixture.store.subscribe(&args, |_| {});
        settle().await;

        control.advance(Duration::from_millis(100));
        settle().await;
        assert_eq!(fixture.attempts.load(Ordering::SeqCst), 1);

        control.advance(Duration::from_millis(100));
        settle().await;
        assert_eq!(fixture.attempts.load(Ordering::SeqCst), 2);

        sub.unsubscribe();
        settle().await;
        control.advance(Duration::from_millis(100));
        settle().await;
        assert_eq!(fixture.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn blurred_gating_starts_and_stops_the_interval() {
        let control = ClockControl::new();
        let fixture = fixture(&control, |builder| {
            builder
                .fresh_age(Duration::ZERO)
                .stale_age(Duration::ZERO)
                .refresh_interval(Duration::from_millis(100))
                .refresh_when_blurred(true)
        });
        let args = "key".to_string();

        let _sub = fixture.store.subscribe(&args, |_| {});
        settle().await;

        // Gate starts closed: ticks pass without revalidating.
        control.advance(Duration::from_millis(200));
        settle().await;
        assert_eq!(fixture.attempts.load(Ordering::SeqCst), 0);

        fixture.events.emit(HostEvent::Blur);
        control.advance(Duration::from_millis(100));
        settle().await;
        assert_eq!(fixture.attempts.load(Ordering::SeqCst), 1);

        fixture.events.emit(HostEvent::Focus);
        control.advance(Duration::from_millis(100));
        settle().await;
        assert_eq!(fixture.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_key_is_structural_serialization() {
        let control = ClockControl::new();
        let fixture = fixture(&control, |builder| builder);
        let key = fixture.store.inner.key_of(&"shiba".to_string());

        assert_eq!(key, "\"shiba\"");
    }
}
