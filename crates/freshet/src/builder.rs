// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The store builder.
//!
//! Created by [`Store::builder`]; every knob from the configuration surface
//! lives here with its default. See the crate documentation for the meaning
//! of the freshness windows and trigger options.

use std::{sync::Arc, time::Duration};

use tick::Clock;

use crate::{
    events::{EventSource, NullEventSource},
    refresh::RefreshPolicy,
    runtime::Runtime,
    store::{CompareFn, FetchFn, KeyFn, Store, StoreOptions},
};

/// Age below which cached data is returned with no revalidation.
pub(crate) const DEFAULT_FRESH_AGE: Duration = Duration::from_secs(2);

/// Window after the fresh age during which stale data is served synchronously
/// while a background fetch runs.
pub(crate) const DEFAULT_STALE_AGE: Duration = Duration::from_secs(30);

/// How many times a failing fetch is retried before the failure is cached.
pub(crate) const DEFAULT_MAX_RETRY_COUNT: u32 = 10;

/// Ceiling for the backoff delay between retry attempts.
pub(crate) const DEFAULT_MAX_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Configures and creates a [`Store`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use freshet::Store;
/// use tick::Clock;
///
/// let clock = Clock::new_frozen();
/// let store = Store::builder(clock, |name: String| async move {
///     Ok::<_, std::io::Error>(format!("hello {name}"))
/// })
/// .fresh_age(Duration::from_secs(2))
/// .stale_age(Duration::from_secs(30))
/// .max_retry_count(3)
/// .build();
///
/// assert_eq!(store.name(), "store");
/// ```
#[must_use = "a builder does nothing until `build` is called"]
pub struct StoreBuilder<A, T> {
    clock: Clock,
    fetch: FetchFn<A, T>,
    key: KeyFn<A>,
    compare: CompareFn<T>,
    name: &'static str,
    initial_data: Option<T>,
    fresh_age: Duration,
    stale_age: Duration,
    max_retry_count: u32,
    max_retry_interval: Duration,
    revalidate_on_focus: bool,
    revalidate_on_network: bool,
    revalidate_on_visibility: bool,
    refresh: RefreshPolicy,
    events: Arc<dyn EventSource>,
}

impl<A, T> StoreBuilder<A, T> {
    pub(crate) fn new(clock: Clock, fetch: FetchFn<A, T>, key: KeyFn<A>, compare: CompareFn<T>) -> Self {
        Self {
            clock,
            fetch,
            key,
            compare,
            name: "store",
            initial_data: None,
            fresh_age: DEFAULT_FRESH_AGE,
            stale_age: DEFAULT_STALE_AGE,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            max_retry_interval: DEFAULT_MAX_RETRY_INTERVAL,
            revalidate_on_focus: false,
            revalidate_on_network: false,
            revalidate_on_visibility: false,
            refresh: RefreshPolicy::default(),
            events: Arc::new(NullEventSource),
        }
    }

    /// Sets the name used to identify this store in logs.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Replaces the default key function (structural JSON serialization of
    /// the arguments) with a custom one.
    ///
    /// Arguments that map to the same key denote the same logical resource.
    pub fn key(mut self, key: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.key = Arc::new(key);
        self
    }

    /// Replaces the default comparison (`PartialEq`) used to suppress
    /// redundant success notifications.
    pub fn compare(mut self, compare: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        self.compare = Arc::new(compare);
        self
    }

    /// Hydrates keys with this value before their first fetch.
    pub fn initial_data(mut self, data: T) -> Self {
        self.initial_data = Some(data);
        self
    }

    /// Sets the window during which cached data is returned with no
    /// revalidation. Defaults to 2 seconds.
    pub fn fresh_age(mut self, age: Duration) -> Self {
        self.fresh_age = age;
        self
    }

    /// Sets the window after [`fresh_age`](Self::fresh_age) during which
    /// stale data is returned synchronously while a background fetch runs.
    /// Defaults to 30 seconds.
    pub fn stale_age(mut self, age: Duration) -> Self {
        self.stale_age = age;
        self
    }

    /// Sets how many times a failing fetch is retried before the failure is
    /// cached. Defaults to 10.
    pub fn max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    /// Sets the backoff ceiling between retry attempts. Defaults to 5
    /// seconds.
    pub fn max_retry_interval(mut self, interval: Duration) -> Self {
        self.max_retry_interval = interval;
        self
    }

    /// Revalidates subscribed keys whenever the host gains focus.
    pub fn revalidate_on_focus(mut self, enabled: bool) -> Self {
        self.revalidate_on_focus = enabled;
        self
    }

    /// Revalidates subscribed keys whenever network connectivity returns.
    pub fn revalidate_on_network(mut self, enabled: bool) -> Self {
        self.revalidate_on_network = enabled;
        self
    }

    /// Revalidates subscribed keys whenever the host becomes visible.
    pub fn revalidate_on_visibility(mut self, enabled: bool) -> Self {
        self.revalidate_on_visibility = enabled;
        self
    }

    /// Periodically triggers revalidation of subscribed keys.
    ///
    /// With none of the `refresh_when_*` modifiers set the interval runs
    /// unconditionally; with modifiers set it runs only while the
    /// corresponding host condition holds.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh.interval = Some(interval);
        self
    }

    /// Runs the refresh interval only while the host is hidden.
    pub fn refresh_when_hidden(mut self, enabled: bool) -> Self {
        self.refresh.when_hidden = enabled;
        self
    }

    /// Runs the refresh interval only while the host is blurred.
    pub fn refresh_when_blurred(mut self, enabled: bool) -> Self {
        self.refresh.when_blurred = enabled;
        self
    }

    /// Runs the refresh interval only while the host is offline.
    pub fn refresh_when_offline(mut self, enabled: bool) -> Self {
        self.refresh.when_offline = enabled;
        self
    }

    /// Sets the host event source that backs the `revalidate_on_*` and
    /// `refresh_when_*` options. Defaults to a no-op source.
    pub fn event_source(mut self, events: Arc<dyn EventSource>) -> Self {
        self.events = events;
        self
    }
}

impl<A, T> StoreBuilder<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates the store.
    #[must_use]
    pub fn build(self) -> Store<A, T> {
        Store::from_options(
            StoreOptions {
                name: self.name,
                fetch: self.fetch,
                key: self.key,
                compare: self.compare,
                initial_data: self.initial_data,
                fresh_age: self.fresh_age,
                stale_age: self.stale_age,
                max_retry_count: self.max_retry_count,
                max_retry_interval: self.max_retry_interval,
                revalidate_on_focus: self.revalidate_on_focus,
                revalidate_on_network: self.revalidate_on_network,
                revalidate_on_visibility: self.revalidate_on_visibility,
                refresh: self.refresh,
                events: self.events,
            },
            Runtime::new(self.clock),
        )
    }
}

impl<A, T> std::fmt::Debug for StoreBuilder<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("name", &self.name)
            .field("fresh_age", &self.fresh_age)
            .field("stale_age", &self.stale_age)
            .field("max_retry_count", &self.max_retry_count)
            .field("max_retry_interval", &self.max_retry_interval)
            .finish_non_exhaustive()
    }
}
