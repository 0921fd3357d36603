// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Retries async operations with exponential backoff, exposing a cancelable
//! handle and a broadcast completion.
//!
//! [`retry`] wraps a fallible async operation supplier into a [`RetryTask`]:
//! a future that runs the operation, waits out an exponentially growing
//! backoff after each failure, and settles after at most `count + 1` total
//! attempts with either the first success or the last error. The task hands
//! out a [`RetryHandle`] whose [`Completion`] can be awaited (and cloned)
//! independently of the task itself, and whose [`cancel`](RetryHandle::cancel)
//! stops further attempts from being scheduled.
//!
//! Delays are produced through [`tick::Clock`], so retry behavior is fully
//! controllable in tests via `tick`'s `ClockControl`.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use redo::{RetryOptions, retry};
//! use tick::Clock;
//!
//! let clock = Clock::new_frozen();
//! let options = RetryOptions {
//!     count: 3,
//!     interval: Duration::from_millis(250),
//! };
//!
//! let task = retry(&clock, options, || async { Ok::<_, &str>(42) });
//! let handle = task.handle();
//!
//! // The task is inert until polled; drive it to completion.
//! let outcome = futures::executor::block_on(task);
//! assert_eq!(outcome, Ok(42));
//! assert_eq!(handle.completion().try_get(), Some(Ok(42)));
//! ```
//!
//! # Cancellation
//!
//! [`RetryHandle::cancel`] marks the handle dead. The driver observes this
//! when handling a failure and after waking from a backoff delay, and settles
//! with the last error instead of attempting again. Cancellation does *not*
//! abort an attempt that is already in flight: if that attempt succeeds, the
//! completion settles with its value anyway. Callers that cancel a retry must
//! therefore treat a late settlement as stale — typically by re-checking
//! their own state before acting on it — rather than assuming it cannot
//! happen.

mod completion;

use std::{
    fmt,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use tick::Clock;

pub use completion::Completion;

/// The first backoff delay; also the floor below which delays never shrink,
/// so a tiny `interval` cannot turn the backoff into a busy loop.
const BASE_DELAY: Duration = Duration::from_millis(10);

/// Controls how often and how densely a [`RetryTask`] re-attempts its
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// How many times to retry after the initial attempt. The operation runs
    /// at most `count + 1` times.
    pub count: u32,
    /// Ceiling for the backoff delay between attempts.
    pub interval: Duration,
}

/// The backoff delay sequence: starts at [`BASE_DELAY`], doubles on every
/// retry, clamped to `[BASE_DELAY, ceiling]`.
#[derive(Debug, Clone)]
struct BackoffDelays {
    next: Duration,
    ceiling: Duration,
}

impl BackoffDelays {
    fn new(ceiling: Duration) -> Self {
        Self {
            next: BASE_DELAY,
            ceiling,
        }
    }
}

impl Iterator for BackoffDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next;
        self.next = BASE_DELAY.max(self.ceiling.min(current.saturating_mul(2)));
        Some(current)
    }
}

/// Observer side of a [`RetryTask`]: a cloneable completion plus cancellation.
///
/// Handles are cheap to clone; all clones observe the same task.
pub struct RetryHandle<T, E> {
    completion: Completion<Result<T, E>>,
    alive: Arc<AtomicBool>,
}

impl<T, E> Clone for RetryHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            completion: self.completion.clone(),
            alive: Arc::clone(&self.alive),
        }
    }
}

impl<T, E> fmt::Debug for RetryHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandle")
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl<T, E> RetryHandle<T, E> {
    /// Returns a completion that settles when the task does.
    #[must_use]
    pub fn completion(&self) -> Completion<Result<T, E>> {
        self.completion.clone()
    }

    /// Marks the handle dead, preventing further attempts from being
    /// scheduled.
    ///
    /// An attempt already in flight is not aborted; see the crate
    /// documentation for the implications.
    pub fn cancel(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Returns `false` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// The driver future created by [`retry`].
///
/// Like any future, the task makes no progress until polled; spawn it or
/// await it. Its output is the same settlement that is broadcast through the
/// handle's [`Completion`]. Dropping the task without driving it to
/// completion leaves the completion unsettled.
#[must_use = "the retry task makes no progress until polled"]
pub struct RetryTask<T, E> {
    handle: RetryHandle<T, E>,
    driver: Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>,
}

impl<T, E> RetryTask<T, E> {
    /// Returns a handle for observing and canceling this task.
    #[must_use]
    pub fn handle(&self) -> RetryHandle<T, E> {
        self.handle.clone()
    }
}

impl<T, E> fmt::Debug for RetryTask<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTask").field("handle", &self.handle).finish_non_exhaustive()
    }
}

impl<T, E> Future for RetryTask<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().driver.as_mut().poll(cx)
    }
}

/// Wraps `supplier` into a [`RetryTask`] with exponential backoff.
///
/// The first attempt starts as soon as the task is polled. Each failed
/// attempt is followed by a backoff delay (10 ms, doubling per retry, clamped
/// to `[10 ms, options.interval]`) before the next attempt, up to
/// `options.count` retries. The task always settles after at most
/// `count + 1` attempts: with the first success, or with the last error.
///
/// Cancellation through the returned task's [`RetryHandle`] is checked when a
/// failure is handled and again after each backoff delay, so a canceled task
/// stops scheduling attempts but never leaves its completion unsettled once
/// an attempt has run.
pub fn retry<T, E, F, Fut>(clock: &Clock, options: RetryOptions, mut supplier: F) -> RetryTask<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let (completer, completion) = completion::pair();
    let alive = Arc::new(AtomicBool::new(true));
    let handle = RetryHandle {
        completion,
        alive: Arc::clone(&alive),
    };

    let clock = clock.clone();
    let driver = Box::pin(async move {
        let mut delays = BackoffDelays::new(options.interval);
        let mut failures: u32 = 0;

        let outcome = loop {
            match supplier().await {
                Ok(value) => break Ok(value),
                Err(error) => {
                    if !alive.load(Ordering::Acquire) || failures >= options.count {
                        break Err(error);
                    }

                    let delay = delays.next().unwrap_or(BASE_DELAY);
                    clock.delay(delay).await;

                    // A cancellation during the backoff clears the scheduled
                    // attempt; the last error becomes the settlement.
                    if !alive.load(Ordering::Acquire) {
                        break Err(error);
                    }
                    failures += 1;
                }
            }
        };

        completer.complete(outcome.clone());
        outcome
    });

    RetryTask { handle, driver }
}
