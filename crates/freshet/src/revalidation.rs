// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use watchmap::{Subscription, WatchMap};

/// The per-key revalidation signal bus.
///
/// A trigger writes a `should_revalidate` flag for a key; the flag is only
/// meaningful at the instant listeners are notified. The store engine attaches
/// one listener per subscribed key that turns signals into actual
/// revalidation calls — the bus itself never fetches anything.
pub(crate) struct RevalidationBus {
    map: WatchMap<String, bool>,
}

impl RevalidationBus {
    pub(crate) fn new() -> Self {
        Self { map: WatchMap::new() }
    }

    pub(crate) fn trigger(&self, key: &str, should_revalidate: bool) {
        self.map.set(&key.to_owned(), should_revalidate);
    }

    pub(crate) fn subscribe(&self, key: &str, listener: impl Fn(&bool) + Send + Sync + 'static) -> Subscription<String, bool> {
        self.map.subscribe(&key.to_owned(), listener)
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self, key: &str) -> usize {
        self.map.listener_count(key)
    }
}

impl std::fmt::Debug for RevalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevalidationBus").finish_non_exhaustive()
    }
}
