//! Component D: worker handoff (§4.4).
//!
//! A per-spawn, single-use rendezvous the manager uses to learn that a
//! freshly spawned worker has actually started running before the manager
//! lets go of its stack-owned copy of the handoff. Three fields, exactly
//! as described: a private lock, a private condition, and a `started` flag
//! — deliberately separate from the scheduler's own lock/condvars so a slow
//! worker start never blocks anyone else from reaching the scheduler state.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Shared between the manager (which waits) and the worker (which signals).
/// The manager constructs one of these on its stack before spawning, clones
/// the `Arc` into the worker's closure, and waits on it; it is dropped once
/// the wait returns, so it never outlives a single firing.
pub struct Handoff {
    started: Mutex<bool>,
    condition: Condvar,
}

impl Handoff {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Mutex::new(false),
            condition: Condvar::new(),
        })
    }

    /// Called by the worker as the very first thing it does, before
    /// touching the payload. Wakes exactly one waiter (the manager).
    pub fn signal_started(&self) {
        let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
        *started = true;
        self.condition.notify_one();
    }

    /// Blocks the manager until the worker has signaled, or until
    /// `timeout` elapses. Returns `true` if the worker started in time.
    ///
    /// A worker that never gets a chance to run (the executor is
    /// overloaded, or the task was dropped before polling) must not wedge
    /// the manager forever — `timeout` bounds the wait so the manager can
    /// fall back to treating the spawn as failed (§8 boundary scenario 5).
    pub fn wait_started(&self, timeout: Duration) -> bool {
        let started = self.started.lock().unwrap_or_else(|e| e.into_inner());
        let (started, result) = self
            .condition
            .wait_timeout_while(started, timeout, |started| !*started)
            .unwrap_or_else(|e| e.into_inner());
        let _ = result;
        *started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_returns_true_once_signaled() {
        let handoff = Handoff::new();
        let worker_side = handoff.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            worker_side.signal_started();
        });

        assert!(handoff.wait_started(Duration::from_secs(1)));
    }

    #[test]
    fn wait_times_out_if_never_signaled() {
        let handoff = Handoff::new();
        assert!(!handoff.wait_started(Duration::from_millis(20)));
    }
}
