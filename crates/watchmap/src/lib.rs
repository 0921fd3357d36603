// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A keyed observable value map with per-key subscriber sets.
//!
//! This crate provides [`WatchMap`], a map from keys to values where every key carries
//! its own set of listeners. Writing a value through [`WatchMap::set`] synchronously
//! invokes every listener currently registered for that key, in registration order.
//! The map has no opinion about what the values mean or when they should change; it is
//! the reactive substrate that higher-level caches specialize.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use watchmap::WatchMap;
//!
//! let map: WatchMap<String, u32> = WatchMap::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let subscription = map.subscribe(&"hits".to_string(), {
//!     let seen = Arc::clone(&seen);
//!     move |value: &u32| seen.lock().unwrap().push(*value)
//! });
//!
//! map.set(&"hits".to_string(), 1);
//! map.set(&"hits".to_string(), 2);
//! subscription.unsubscribe();
//! map.set(&"hits".to_string(), 3);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//! assert_eq!(map.get(&"hits".to_string()), Some(3));
//! ```
//!
//! # Reentrancy
//!
//! Listeners are invoked with no internal lock held: the listener list is snapshotted
//! under the lock and the calls happen after it is released. A listener may therefore
//! call back into the same map (subscribe, unsubscribe, read, or write) without
//! deadlocking. A listener added while a notification is being delivered does not
//! receive that notification; a listener removed while a notification is being
//! delivered may still receive it.
//!
//! # Thread safety
//!
//! [`WatchMap`] is `Send` and `Sync` and clones share the same underlying state, in
//! the same way clones of a channel handle do.

use std::{
    borrow::Borrow,
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

/// A listener registered for a single key of a [`WatchMap`].
pub type Listener<V> = Arc<dyn Fn(&V) + Send + Sync>;

struct ListenerEntry<V> {
    id: u64,
    listener: Listener<V>,
}

struct State<K, V> {
    values: HashMap<K, V>,
    // Registration order matters for notification delivery, so listeners live
    // in a Vec rather than a Set keyed by identity.
    subscribers: HashMap<K, Vec<ListenerEntry<V>>>,
    next_id: u64,
}

struct Shared<K, V> {
    state: Mutex<State<K, V>>,
}

/// A keyed value map whose entries can be observed.
///
/// See the [crate documentation](crate) for an overview and examples.
pub struct WatchMap<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for WatchMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Default for WatchMap<K, V> {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    values: HashMap::new(),
                    subscribers: HashMap::new(),
                    next_id: 0,
                }),
            }),
        }
    }
}

impl<K, V> fmt::Debug for WatchMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchMap").finish_non_exhaustive()
    }
}

impl<K, V> WatchMap<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the value stored for `key`, if any.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.shared.state.lock().values.get(key).cloned()
    }

    /// Stores `value` for `key` and synchronously notifies every listener
    /// registered for that key, in registration order.
    pub fn set(&self, key: &K, value: V) {
        self.set_impl(key, value, true);
    }

    /// Stores `value` for `key` without notifying listeners.
    ///
    /// Used for bookkeeping writes where the observable value is unchanged
    /// (for example, refreshing a timestamp attached to an otherwise
    /// identical value).
    pub fn set_silent(&self, key: &K, value: V) {
        self.set_impl(key, value, false);
    }

    fn set_impl(&self, key: &K, value: V, notify: bool) {
        let snapshot = notify.then(|| value.clone());
        let listeners: Vec<Listener<V>> = {
            let mut state = self.shared.state.lock();
            state.values.insert(key.clone(), value);
            if notify {
                state
                    .subscribers
                    .get(key)
                    .map(|entries| entries.iter().map(|entry| Arc::clone(&entry.listener)).collect())
                    .unwrap_or_default()
            } else {
                Vec::new()
            }
        };

        if let Some(snapshot) = snapshot {
            for listener in listeners {
                listener(&snapshot);
            }
        }
    }

    /// Registers `listener` for `key` and returns a [`Subscription`] that
    /// removes it again.
    ///
    /// The listener fires on every [`set`](Self::set) for the key until the
    /// subscription is dropped or explicitly unsubscribed.
    pub fn subscribe(&self, key: &K, listener: impl Fn(&V) + Send + Sync + 'static) -> Subscription<K, V> {
        let id = {
            let mut state = self.shared.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.entry(key.clone()).or_default().push(ListenerEntry {
                id,
                listener: Arc::new(listener),
            });
            id
        };

        Subscription {
            shared: Arc::downgrade(&self.shared),
            key: key.clone(),
            id,
            active: true,
        }
    }

    /// Returns the number of listeners currently registered for `key`.
    ///
    /// This reflects exactly the listeners added and not yet removed; callers
    /// use it for reference counting, not iteration.
    #[must_use]
    pub fn listener_count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.shared.state.lock().subscribers.get(key).map_or(0, Vec::len)
    }
}

/// Removes a listener from a [`WatchMap`] when dropped or explicitly
/// unsubscribed.
///
/// The subscription holds only a weak reference to the map, so keeping a
/// subscription alive does not keep the map alive.
#[must_use = "dropping a subscription immediately removes its listener"]
pub struct Subscription<K: Eq + Hash, V> {
    shared: Weak<Shared<K, V>>,
    key: K,
    id: u64,
    active: bool,
}

impl<K: Eq + Hash, V> Subscription<K, V> {
    /// Removes the listener from the map.
    ///
    /// Dropping the subscription has the same effect; this method exists so
    /// the removal can be made explicit at call sites that care about when
    /// it happens.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(shared) = self.shared.upgrade() {
            let mut state = shared.state.lock();
            if let Some(entries) = state.subscribers.get_mut(&self.key) {
                entries.retain(|entry| entry.id != self.id);
                if entries.is_empty() {
                    state.subscribers.remove(&self.key);
                }
            }
        }
    }
}

impl<K: Eq + Hash, V> Drop for Subscription<K, V> {
    fn drop(&mut self) {
        self.remove();
    }
}

impl<K: Eq + Hash, V> fmt::Debug for Subscription<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex as StdMutex,
        atomic::{AtomicUsize, Ordering},
    };

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(WatchMap<String, u32>: Send, Sync, Clone);
        static_assertions::assert_impl_all!(Subscription<String, u32>: Send, Sync);
    }

    #[test]
    fn get_absent_key_returns_none() {
        let map: WatchMap<String, u32> = WatchMap::new();
        assert_eq!(map.get(&"missing".to_string()), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let map = WatchMap::new();
        let key = "key".to_string();

        map.set(&key, 7);
        assert_eq!(map.get(&key), Some(7));

        map.set(&key, 8);
        assert_eq!(map.get(&key), Some(8));
    }

    #[test]
    fn set_notifies_in_registration_order() {
        let map: WatchMap<String, u32> = WatchMap::new();
        let key = "key".to_string();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let _first = map.subscribe(&key, {
            let order = Arc::clone(&order);
            move |value: &u32| order.lock().unwrap().push(("first", *value))
        });
        let _second = map.subscribe(&key, {
            let order = Arc::clone(&order);
            move |value: &u32| order.lock().unwrap().push(("second", *value))
        });

        map.set(&key, 5);

        assert_eq!(*order.lock().unwrap(), vec![("first", 5), ("second", 5)]);
    }

    #[test]
    fn set_silent_skips_notification() {
        let map: WatchMap<String, u32> = WatchMap::new();
        let key = "key".to_string();
        let calls = Arc::new(AtomicUsize::new(0));

        let _sub = map.subscribe(&key, {
            let calls = Arc::clone(&calls);
            move |_: &u32| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        map.set_silent(&key, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(map.get(&key), Some(1));

        map.set(&key, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notification_is_scoped_to_the_written_key() {
        let map: WatchMap<String, u32> = WatchMap::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _sub = map.subscribe(&"a".to_string(), {
            let calls = Arc::clone(&calls);
            move |_: &u32| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        map.set(&"b".to_string(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn explicit_unsubscribe_removes_listener() {
        let map: WatchMap<String, u32> = WatchMap::new();
        let key = "key".to_string();
        let calls = Arc::new(AtomicUsize::new(0));

        let sub = map.subscribe(&key, {
            let calls = Arc::clone(&calls);
            move |_: &u32| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(map.listener_count(&key), 1);
        sub.unsubscribe();
        assert_eq!(map.listener_count(&key), 0);

        map.set(&key, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_subscription_removes_listener() {
        let map: WatchMap<String, u32> = WatchMap::new();
        let key = "key".to_string();

        {
            let _sub = map.subscribe(&key, |_: &u32| {});
            assert_eq!(map.listener_count(&key), 1);
        }

        assert_eq!(map.listener_count(&key), 0);
    }

    #[test]
    fn listener_count_tracks_multiple_subscribers() {
        let map: WatchMap<String, u32> = WatchMap::new();
        let key = "key".to_string();

        let first = map.subscribe(&key, |_: &u32| {});
        let second = map.subscribe(&key, |_: &u32| {});
        assert_eq!(map.listener_count(&key), 2);

        first.unsubscribe();
        assert_eq!(map.listener_count(&key), 1);

        second.unsubscribe();
        assert_eq!(map.listener_count(&key), 0);
    }

    #[test]
    fn listener_may_reenter_the_map() {
        let map: WatchMap<String, u32> = WatchMap::new();
        let key = "key".to_string();
        let observed = Arc::new(StdMutex::new(Vec::new()));

        let _sub = map.subscribe(&key, {
            let map = map.clone();
            let observed = Arc::clone(&observed);
            move |value: &u32| {
                // Writing to a different key from inside a notification must
                // not deadlock.
                map.set(&"echo".to_string(), *value + 100);
                observed.lock().unwrap().push(*value);
            }
        });

        map.set(&key, 1);

        assert_eq!(*observed.lock().unwrap(), vec![1]);
        assert_eq!(map.get(&"echo".to_string()), Some(101));
    }

    #[test]
    fn subscription_outliving_map_is_inert() {
        let map: WatchMap<String, u32> = WatchMap::new();
        let sub = map.subscribe(&"key".to_string(), |_: &u32| {});

        drop(map);

        // The weak reference is gone; unsubscribing is a no-op rather than a panic.
        sub.unsubscribe();
    }

    #[test]
    fn clones_share_state() {
        let map: WatchMap<String, u32> = WatchMap::new();
        let clone = map.clone();
        let key = "key".to_string();

        map.set(&key, 9);
        assert_eq!(clone.get(&key), Some(9));

        let calls = Arc::new(AtomicUsize::new(0));
        let _sub = clone.subscribe(&key, {
            let calls = Arc::clone(&calls);
            move |_: &u32| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        map.set(&key, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
