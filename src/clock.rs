//! Component A: the clock.
//!
//! `now_utc_seconds` and `sleep_until` are the only time primitives the rest
//! of the scheduler is allowed to touch; this keeps second-granularity
//! wall-clock semantics in one place and makes the manager loop testable by
//! swapping in a fake clock.

use chrono::Utc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Why [`Clock::sleep_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// The deadline elapsed.
    Deadline,
    /// The cancel token was signaled before the deadline.
    Cancelled,
    /// The underlying condvar woke up for no tracked reason. Callers MUST
    /// treat this identically to re-checking their predicate and sleeping
    /// again if nothing actually changed.
    Spurious,
}

/// A one-shot, loggable reason a fire request was rejected outright instead
/// of being scheduled, per §4.1: the scheduler is not offered sub-second
/// precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedPrecision;

impl std::fmt::Display for UnsupportedPrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-second precision is not supported by this scheduler")
    }
}

impl std::error::Error for UnsupportedPrecision {}

/// A shared, `wait`-able cancellation signal passed to [`Clock::sleep_until`].
///
/// This is intentionally the same lock+condvar shape as the scheduler's own
/// condition variables (§4.5): a cancel token is just "signal one more
/// condvar", so a single primitive serves both the manager's `new_work`
/// wakeups and a fake clock's test harness.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap();
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic wall-clock time in whole seconds (UTC), plus a sleep-until
/// primitive. Sub-second precision is explicitly not offered: see
/// [`UnsupportedPrecision`].
pub trait Clock: Send + Sync {
    fn now_utc_seconds(&self) -> i64;

    /// Blocks the calling thread until `deadline` (UTC seconds) elapses or
    /// `cancel` is signaled, whichever comes first.
    fn sleep_until(&self, deadline: i64, cancel: &CancelToken) -> WakeCause;
}

/// The clock used in production: `chrono::Utc::now()` plus
/// `Condvar::wait_timeout` against the supplied cancel token.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn sleep_until(&self, deadline: i64, cancel: &CancelToken) -> WakeCause {
        let now = self.now_utc_seconds();
        if deadline <= now {
            return WakeCause::Deadline;
        }
        let duration = Duration::from_secs((deadline - now) as u64);

        let (lock, cvar) = &*cancel.inner;
        let guard = lock.lock().unwrap();
        if *guard {
            return WakeCause::Cancelled;
        }
        let (guard, timeout) = cvar.wait_timeout(guard, duration).unwrap();
        if *guard {
            WakeCause::Cancelled
        } else if timeout.timed_out() {
            WakeCause::Deadline
        } else {
            WakeCause::Spurious
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_in_the_past_returns_immediately() {
        let clock = SystemClock;
        let cancel = CancelToken::new();
        let past = clock.now_utc_seconds() - 10;
        assert_eq!(clock.sleep_until(past, &cancel), WakeCause::Deadline);
    }

    #[test]
    fn cancel_wakes_a_future_deadline() {
        let clock = SystemClock;
        let cancel = CancelToken::new();
        let cancel2 = cancel.clone();
        let deadline = clock.now_utc_seconds() + 30;

        let handle = std::thread::spawn(move || clock.sleep_until(deadline, &cancel2));
        std::thread::sleep(Duration::from_millis(50));
        cancel.cancel();

        assert_eq!(handle.join().unwrap(), WakeCause::Cancelled);
    }
}
