// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The external event-source capability.
//!
//! Revalidation triggers such as "the window regained focus" or "the network
//! came back" originate outside the store. The store depends only on the
//! [`EventSource`] capability shape, never on a concrete host environment: a
//! browser-backed host adapter maps its native events onto [`HostEvent`]s,
//! non-interactive hosts use [`NullEventSource`], and tests use
//! [`StubEventSource`] to emit events by hand.

use std::{fmt, sync::Arc};

/// A lifecycle event of the host environment.
///
/// The browser's `visibilitychange` is modeled as the [`Visible`][Self::Visible]
/// / [`Hidden`][Self::Hidden] pair so that handlers never need to query host
/// state to interpret a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum HostEvent {
    /// The host gained input focus.
    Focus,
    /// The host lost input focus.
    Blur,
    /// Network connectivity was restored.
    Online,
    /// Network connectivity was lost.
    Offline,
    /// The host became visible.
    Visible,
    /// The host was hidden.
    Hidden,
}

/// A handler registered for a [`HostEvent`].
pub type HostEventHandler = Arc<dyn Fn() + Send + Sync>;

/// The capability the store uses to observe host lifecycle events.
///
/// Implementations must invoke every handler registered for an event each
/// time that event occurs, until the corresponding [`HostSubscription`] is
/// dropped or unsubscribed.
pub trait EventSource: Send + Sync {
    /// Registers `handler` to run whenever `event` occurs.
    fn subscribe(&self, event: HostEvent, handler: HostEventHandler) -> HostSubscription;
}

/// Undoes an [`EventSource::subscribe`] when dropped or explicitly
/// unsubscribed.
#[must_use = "dropping a host subscription immediately removes its handler"]
pub struct HostSubscription(Option<Box<dyn FnOnce() + Send>>);

impl HostSubscription {
    /// Creates a subscription that runs `unsubscribe` exactly once on
    /// teardown.
    #[must_use]
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(unsubscribe)))
    }

    /// Creates a subscription with nothing to tear down.
    #[must_use]
    pub fn noop() -> Self {
        Self(None)
    }

    /// Removes the handler from the event source.
    ///
    /// Dropping the subscription has the same effect.
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.0.take() {
            unsubscribe();
        }
    }
}

impl Drop for HostSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.0.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for HostSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSubscription").finish_non_exhaustive()
    }
}

/// An event source for hosts without lifecycle events; never fires anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSource;

impl EventSource for NullEventSource {
    fn subscribe(&self, _event: HostEvent, _handler: HostEventHandler) -> HostSubscription {
        HostSubscription::noop()
    }
}

#[cfg(any(feature = "test-util", test))]
mod stub {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::{EventSource, HostEvent, HostEventHandler, HostSubscription};

    /// An in-memory event source for tests: records subscriptions and lets the
    /// test emit events on demand.
    #[derive(Default)]
    pub struct StubEventSource {
        state: std::sync::Arc<Mutex<StubState>>,
    }

    #[derive(Default)]
    struct StubState {
        handlers: HashMap<HostEvent, Vec<(u64, HostEventHandler)>>,
        next_id: u64,
    }

    impl StubEventSource {
        /// Creates an empty stub.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Invokes every handler currently registered for `event`.
        pub fn emit(&self, event: HostEvent) {
            let handlers: Vec<HostEventHandler> = self
                .state
                .lock()
                .handlers
                .get(&event)
                .map(|entries| entries.iter().map(|(_, handler)| std::sync::Arc::clone(handler)).collect())
                .unwrap_or_default();
            for handler in handlers {
                handler();
            }
        }

        /// Returns how many handlers are registered for `event`.
        #[must_use]
        pub fn handler_count(&self, event: HostEvent) -> usize {
            self.state.lock().handlers.get(&event).map_or(0, Vec::len)
        }
    }

    impl EventSource for StubEventSource {
        fn subscribe(&self, event: HostEvent, handler: HostEventHandler) -> HostSubscription {
            let id = {
                let mut state = self.state.lock();
                let id = state.next_id;
                state.next_id += 1;
                state.handlers.entry(event).or_default().push((id, handler));
                id
            };

            let state = std::sync::Arc::clone(&self.state);
            HostSubscription::new(move || {
                let mut state = state.lock();
                if let Some(entries) = state.handlers.get_mut(&event) {
                    entries.retain(|(entry_id, _)| *entry_id != id);
                }
            })
        }
    }

    impl std::fmt::Debug for StubEventSource {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("StubEventSource").finish_non_exhaustive()
        }
    }
}

#[cfg(any(feature = "test-util", test))]
pub use stub::StubEventSource;
