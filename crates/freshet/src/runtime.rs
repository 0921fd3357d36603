// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Runtime abstraction for background tasks.
//!
//! The store never awaits anything inline; fetch drivers and polling loops
//! run as background tasks spawned through this module. Only a Tokio-backed
//! runtime is currently provided (feature `tokio`, on by default).

use tick::Clock;

#[derive(Debug, Clone)]
pub(crate) struct Runtime {
    clock: Clock,
}

impl Runtime {
    pub(crate) fn new(clock: Clock) -> Self {
        Self { clock }
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Spawns `work` as a fire-and-forget background task.
    ///
    /// # Panics
    ///
    /// Panics if no runtime feature is enabled, or (with the `tokio` feature)
    /// when called outside of a Tokio runtime context.
    pub(crate) fn spawn<F>(&self, work: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        #[cfg(feature = "tokio")]
        return TaskHandle {
            abort: Some(tokio::spawn(work).abort_handle()),
        };

        #[cfg(not(feature = "tokio"))]
        {
            drop(work);
            unimplemented!("no runtime feature enabled; enable the `tokio` feature");
        }
    }
}

/// Aborts the spawned task when told to; detaches when simply dropped.
#[derive(Debug)]
pub(crate) struct TaskHandle {
    #[cfg(feature = "tokio")]
    abort: Option<tokio::task::AbortHandle>,
}

impl TaskHandle {
    pub(crate) fn abort(self) {
        #[cfg(feature = "tokio")]
        if let Some(abort) = self.abort {
            abort.abort();
        }
    }
}
