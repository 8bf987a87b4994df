//! Bounded waiting
//!
//! Every wait in the SMP core is a poll against a monotonic clock with an
//! explicit deadline; the timeout is an ordinary outcome the caller
//! inspects, never an error that gets swallowed.

use core::time::Duration;

/// Monotonic time source with a busy delay.
pub trait Clock {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Wait for at least `duration` without sleeping in the scheduler sense.
    fn delay(&self, duration: Duration);
}

/// Poll `done` every `interval` until it returns `true` or `timeout` has
/// elapsed.
///
/// Returns whether `done` was observed true. The predicate is always
/// evaluated at least once, and once more after the last delay, so a
/// condition that becomes true right at the deadline is not missed.
pub fn poll_with_timeout<C, F>(clock: &C, timeout: Duration, interval: Duration, mut done: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    let start = clock.now();
    loop {
        if done() {
            return true;
        }
        if clock.now().saturating_sub(start) >= timeout {
            return false;
        }
        clock.delay(interval);
    }
}
