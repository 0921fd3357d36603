// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use parking_lot::Mutex;

struct Slot<T> {
    value: Option<T>,
    wakers: Vec<Waker>,
}

/// A cloneable future that completes when the associated operation settles.
///
/// Every clone shares the same underlying slot: once the operation settles,
/// all clones resolve to clones of the same value, and any clone created
/// afterwards resolves immediately. Use [`try_get`](Completion::try_get) to
/// inspect the slot without awaiting.
///
/// If the operation driving the completion is dropped before it settles, the
/// completion never resolves; callers that hand out completions for
/// operations they may abandon are responsible for not leaving waiters
/// behind.
pub struct Completion<T> {
    shared: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.shared.lock().value.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone> Completion<T> {
    /// Returns a clone of the settled value, or `None` while the operation is
    /// still in flight.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.shared.lock().value.clone()
    }
}

impl<T> Completion<T> {
    /// Returns `true` when `self` and `other` observe the same underlying
    /// slot, i.e. they were cloned from the same operation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T: Clone> Future for Completion<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.shared.lock();
        if let Some(value) = &slot.value {
            return Poll::Ready(value.clone());
        }

        // Re-polls of the same clone must not grow the waker list without bound.
        if !slot.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// The writing side of a [`Completion`]; settles it exactly once.
pub(crate) struct Completer<T> {
    shared: Arc<Mutex<Slot<T>>>,
}

impl<T> Completer<T> {
    pub(crate) fn complete(self, value: T) {
        let wakers = {
            let mut slot = self.shared.lock();
            slot.value = Some(value);
            std::mem::take(&mut slot.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer").finish_non_exhaustive()
    }
}

/// Creates a connected completer/completion pair.
pub(crate) fn pair<T>() -> (Completer<T>, Completion<T>) {
    let shared = Arc::new(Mutex::new(Slot {
        value: None,
        wakers: Vec::new(),
    }));
    (
        Completer {
            shared: Arc::clone(&shared),
        },
        Completion { shared },
    )
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Completion<u32>: Send, Sync, Clone);
    }

    #[test]
    fn try_get_before_completion_is_none() {
        let (_completer, completion) = pair::<u32>();
        assert_eq!(completion.try_get(), None);
    }

    #[test]
    fn complete_settles_all_clones() {
        let (completer, completion) = pair();
        let other = completion.clone();

        completer.complete(17u32);

        assert_eq!(completion.try_get(), Some(17));
        assert_eq!(other.try_get(), Some(17));
        assert_eq!(futures::executor::block_on(other), 17);
    }

    #[test]
    fn awaiting_before_completion_blocks_until_settled() {
        let (completer, completion) = pair();

        let waiter = std::thread::spawn(move || futures::executor::block_on(completion));
        completer.complete("done");

        assert_eq!(waiter.join().expect("waiter thread panicked"), "done");
    }

    #[test]
    fn clone_created_after_completion_resolves_immediately() {
        let (completer, completion) = pair();
        completer.complete(5u32);

        let late = completion.clone();
        assert_eq!(futures::executor::block_on(late), 5);
    }

    #[test]
    fn ptr_eq_distinguishes_operations() {
        let (_a_completer, a) = pair::<u32>();
        let (_b_completer, b) = pair::<u32>();

        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }
}
