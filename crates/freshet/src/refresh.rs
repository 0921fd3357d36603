// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Periodic revalidation polling.
//!
//! When a store is configured with a refresh interval, every subscribed key
//! gets a background polling loop that raises a revalidation signal on each
//! tick. Modifier flags gate *when* a loop is allowed to signal: each enabled
//! modifier runs its own loop whose gate opens and closes with the matching
//! pair of host events, and with no modifiers at all the single loop runs
//! unconditionally.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::StreamExt;
use tick::PeriodicTimer;

use crate::{
    events::HostEvent,
    runtime::{Runtime, TaskHandle},
};

/// How a store's refresh interval is configured and gated.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RefreshPolicy {
    pub interval: Option<Duration>,
    pub when_hidden: bool,
    pub when_blurred: bool,
    pub when_offline: bool,
}

impl RefreshPolicy {
    /// The modifier gates, as (enabled, gate-opening event, gate-closing event).
    pub(crate) fn gates(&self) -> [(bool, HostEvent, HostEvent); 3] {
        [
            (self.when_blurred, HostEvent::Blur, HostEvent::Focus),
            (self.when_offline, HostEvent::Offline, HostEvent::Online),
            (self.when_hidden, HostEvent::Hidden, HostEvent::Visible),
        ]
    }

    pub(crate) fn is_gated(&self) -> bool {
        self.when_hidden || self.when_blurred || self.when_offline
    }
}

/// Spawns a loop that invokes `on_tick` every `interval` while `gate` is open.
///
/// The loop never exits on its own; the caller owns the returned handle and
/// aborts it during subscription teardown.
pub(crate) fn spawn_polling(
    runtime: &Runtime,
    interval: Duration,
    gate: Arc<AtomicBool>,
    on_tick: impl Fn() + Send + Sync + 'static,
) -> TaskHandle {
    let clock = runtime.clock().clone();
    runtime.spawn(async move {
        let mut timer = PeriodicTimer::new(&clock, interval);
        while let Some(()) = timer.next().await {
            if gate.load(Ordering::Acquire) {
                on_tick();
            }
        }
    })
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tick::ClockControl;

    use super::*;

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn gates_cover_every_modifier() {
        let policy = RefreshPolicy {
            interval: Some(Duration::from_millis(100)),
            when_hidden: true,
            when_blurred: false,
            when_offline: true,
        };

        assert!(policy.is_gated());
        let enabled: Vec<_> = policy.gates().into_iter().filter(|(enabled, _, _)| *enabled).collect();
        assert_eq!(enabled.len(), 2);
    }

    #[test]
    fn no_modifiers_means_ungated() {
        let policy = RefreshPolicy {
            interval: Some(Duration::from_millis(100)),
            ..RefreshPolicy::default()
        };
        assert!(!policy.is_gated());
    }

    #[tokio::test]
    async fn polling_ticks_only_while_the_gate_is_open() {
        let control = ClockControl::new();
        let runtime = Runtime::new(control.to_clock());
        let gate = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicUsize::new(0));

        let handle = spawn_polling(&runtime, Duration::from_millis(100), Arc::clone(&gate), {
            let ticks = Arc::clone(&ticks);
            move || {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        settle().await;
        control.advance(Duration::from_millis(100));
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        gate.store(true, Ordering::Release);
        control.advance(Duration::from_millis(100));
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        control.advance(Duration::from_millis(100));
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        handle.abort();
        settle().await;
        control.advance(Duration::from_millis(100));
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
