//! Single-shot completion signal
//!
//! Signalled by a secondary core once it is online; waited on, with a
//! deadline, by the orchestrator. Re-armed before every attempt so a late
//! signal from an earlier attempt cannot satisfy the next one.

use crate::wait::{Clock, poll_with_timeout};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

#[derive(Debug, Default)]
pub struct Completion {
    done: AtomicBool,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// Re-arm for a new attempt.
    pub fn reinit(&self) {
        self.done.store(false, Ordering::SeqCst);
    }

    /// Signal the waiter.
    pub fn complete(&self) {
        self.done.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Wait until signalled or `timeout` elapses; returns whether the
    /// signal arrived.
    pub fn wait_timeout<C: Clock + ?Sized>(
        &self,
        clock: &C,
        timeout: Duration,
        interval: Duration,
    ) -> bool {
        poll_with_timeout(clock, timeout, interval, || self.is_done())
    }
}
