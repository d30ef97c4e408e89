//! Scheduler tunables (§10.2). The teacher expresses these as bare
//! associated constants (`SECONDS_IN_AN_HOUR`, `PADDING`); generalized here
//! into a small struct so a caller can override them (e.g. a faster
//! `worker_drain_poll_interval` in tests) without forking the crate.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Added to every timed wait so a manager woken just shy of its
    /// deadline doesn't immediately spin back to sleep. Mirrors the
    /// teacher's `PADDING`.
    pub poll_padding: Duration,
    /// How long the manager sleeps when the queue is empty, checked again
    /// on every wake. Mirrors the teacher's `SECONDS_IN_AN_HOUR`.
    pub idle_sleep_ceiling: Duration,
    /// Upper bound on how long the manager waits for a freshly spawned
    /// worker to acknowledge startup before treating the spawn as failed.
    pub handoff_wait: Duration,
    /// Interval between `workers_count()` polls while draining running
    /// workers on shutdown.
    pub worker_drain_poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_padding: Duration::from_millis(200),
            idle_sleep_ceiling: Duration::from_secs(3600),
            handoff_wait: Duration::from_secs(5),
            worker_drain_poll_interval: Duration::from_millis(50),
        }
    }
}
