//! Component B: the event queue.
//!
//! Thread-unsafe by itself (§4.2) — it is always reached through the
//! scheduler lock. A min-heap of [`Job`] records keyed by `next_exec_time`,
//! tie-broken by insertion order, built the same way the teacher's
//! `job::JobBoard` wraps a `BinaryHeap<Reverse<Job<T>>>`.

use crate::job::{Job, JobKey, JobSpecRest};
use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A min-heap of jobs ordered by next-fire instant. See §3/§4.2 for the
/// full contract.
pub struct EventQueue<T>
where
    T: TimeZone + Send + Sync,
    T::Offset: Send,
{
    timezone: T,
    next_sequence: u64,
    jobs: BinaryHeap<Reverse<Job<T>>>,
}

impl<T> EventQueue<T>
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    pub fn new(timezone: T) -> Self {
        Self {
            timezone,
            next_sequence: 0,
            jobs: BinaryHeap::new(),
        }
    }

    /// Inserts a newly-described job, assigning it the next monotonic
    /// sequence number for FIFO tie-breaking. O(log n).
    pub fn insert(&mut self, key: JobKey, rest: JobSpecRest) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let job = Job::new(key, sequence, rest, self.timezone);
        self.jobs.push(Reverse(job));
    }

    /// Re-inserts a job record the manager already owns (popped via
    /// [`Self::remove_top`] and mutated). Its original `sequence` is
    /// preserved, so FIFO tie-breaking survives the round trip. This is the
    /// concrete realization of §4.2's `top_changed()`: rather than mutating
    /// an element in place inside the heap (which `BinaryHeap` does not
    /// allow safely), the manager pops, mutates its own copy, and reinserts.
    pub fn reinsert(&mut self, job: Job<T>) {
        self.jobs.push(Reverse(job));
    }

    /// Returns a reference to the job at the top of the heap (earliest
    /// `next_exec_time`), or `None` if the queue is empty. O(1).
    pub fn top(&self) -> Option<&Job<T>> {
        self.jobs.peek().map(|Reverse(job)| job)
    }

    /// Pops and returns the top job, transferring ownership to the caller.
    /// O(log n).
    pub fn remove_top(&mut self) -> Option<Job<T>> {
        self.jobs.pop().map(|Reverse(job)| job)
    }

    /// Recomputes every job's `next_exec_time` against a new `now`, then
    /// re-heapifies. O(n log n). The only way to handle a large clock jump
    /// or a resume-after-suspend without a storm of overdue fires (§9).
    pub fn recalculate_all(&mut self, now: DateTime<Utc>) {
        self.jobs = self
            .drain_unordered()
            .into_iter()
            .map(|mut job| {
                let is_stale = job
                    .next_exec_time()
                    .map(|t| t.with_timezone(&Utc) <= now)
                    .unwrap_or(false);
                if is_stale {
                    job.advance_schedule(now);
                }
                Reverse(job)
            })
            .collect();
    }

    /// True if no jobs remain (including exhausted/disabled jobs pending
    /// cleanup).
    pub fn empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs currently tracked by the queue, not just eligible
    /// ones. Safe to call only while already holding the scheduler lock
    /// (§4.2: `events_count_unlocked`).
    pub fn count(&self) -> usize {
        self.jobs.len()
    }

    /// Removes a job by identity, wherever it sits in the heap. O(n): a
    /// linear scan plus a full rebuild, the cost §4.2 explicitly accepts
    /// for this operation.
    pub fn remove_by_identity(&mut self, key: &JobKey) -> Option<Job<T>> {
        let mut found = None;
        let remaining = self
            .drain_unordered()
            .into_iter()
            .filter_map(|job| {
                if found.is_none() && job.key() == key {
                    found = Some(job);
                    None
                } else {
                    Some(job)
                }
            })
            .map(Reverse);
        self.jobs = remaining.collect();
        found
    }

    /// Mutates a job by identity without disturbing anything else in the
    /// heap, then re-heapifies. O(n): `BinaryHeap` offers no safe in-place
    /// mutable access except to its top (`peek_mut`), and a worker's
    /// "I'm done" callback may land on a job that isn't the top by the time
    /// it runs (another job may have been inserted ahead of it while the
    /// worker executed). Used by the worker epilogue (`on_worker_finish`)
    /// to clear `running` on a job that is still live in the rotation.
    pub fn with_job_mut<R>(&mut self, key: &JobKey, f: impl FnOnce(&mut Job<T>) -> R) -> Option<R> {
        let mut jobs = self.drain_unordered();
        let mut result = None;
        for job in jobs.iter_mut() {
            if job.key() == key {
                result = Some(f(job));
                break;
            }
        }
        self.jobs = jobs.into_iter().map(Reverse).collect();
        result
    }

    fn drain_unordered(&mut self) -> Vec<Job<T>> {
        std::mem::take(&mut self.jobs)
            .into_vec()
            .into_iter()
            .map(|Reverse(job)| job)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, Limit, Recurrence};
    use crate::payload::{AsyncFn, ClosurePayload, ExecResult};
    use std::sync::Arc;

    fn noop() -> Arc<dyn crate::payload::PayloadAdapter> {
        struct Noop;
        impl AsyncFn for Noop {
            fn call(&self) -> futures::future::BoxFuture<'static, ExecResult> {
                Box::pin(async { ExecResult::Ok })
            }
        }
        Arc::new(ClosurePayload::new(Noop))
    }

    fn rest(schedule: &str) -> JobSpecRest {
        JobSpecRest {
            definer_principal: "root".into(),
            schema: "db".into(),
            recurrence: Recurrence::Cron(schedule.parse().unwrap(), Limit::None),
            status: JobStatus::Enabled,
            payload: noop(),
        }
    }

    #[test]
    fn top_is_the_earliest_job() {
        let mut queue = EventQueue::new(Utc);
        queue.insert(JobKey::new("db", "every_minute"), rest("0 * * * * *"));
        queue.insert(JobKey::new("db", "every_second"), rest("* * * * * *"));

        assert_eq!(queue.top().unwrap().key().job_name, "every_second");
    }

    #[test]
    fn remove_by_identity_drops_the_right_job() {
        let mut queue = EventQueue::new(Utc);
        queue.insert(JobKey::new("db", "a"), rest("0 * * * * *"));
        queue.insert(JobKey::new("db", "b"), rest("0 * * * * *"));

        let removed = queue.remove_by_identity(&JobKey::new("db", "a"));
        assert!(removed.is_some());
        assert_eq!(queue.count(), 1);
        assert_eq!(queue.top().unwrap().key().job_name, "b");
    }

    #[test]
    fn with_job_mut_flips_a_flag_without_losing_others() {
        let mut queue = EventQueue::new(Utc);
        queue.insert(JobKey::new("db", "a"), rest("0 * * * * *"));
        queue.insert(JobKey::new("db", "b"), rest("0 * * * * *"));

        let key = JobKey::new("db", "a");
        let touched = queue.with_job_mut(&key, |job| {
            job.set_running(true);
            job.running()
        });
        assert_eq!(touched, Some(true));
        assert_eq!(queue.count(), 2);
    }

    #[test]
    fn empty_queue_reports_empty() {
        let queue: EventQueue<Utc> = EventQueue::new(Utc);
        assert!(queue.empty());
        assert_eq!(queue.count(), 0);
    }
}
