//! Component C: the Job Record.
//!
//! Holds a schedule (boxed iterator of future fire instants, exactly the
//! way the teacher's `job_internal::Job` does) plus the volatile state
//! (`running`, `dropped`, `status`, `execution_flags`) the manager mutates
//! under the scheduler lock. Everything about *executing* a job — the
//! actual compiled body — lives behind [`crate::payload::PayloadAdapter`];
//! a `Job` only knows schedule arithmetic.

use crate::payload::PayloadAdapter;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use cron::Schedule;
use std::sync::Arc;

/// Unique, immutable identity of a job: `(database_name, job_name)` per §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub database_name: String,
    pub job_name: String,
}

impl JobKey {
    pub fn new(database_name: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            job_name: job_name.into(),
        }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database_name, self.job_name)
    }
}

/// `status` per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Enabled,
    Disabled,
}

/// How many times (or until when) a recurring schedule should fire. Kept
/// from the teacher's `Limit` almost verbatim; a one-shot schedule
/// ([`Recurrence::Once`]) ignores this entirely since it always fires
/// exactly once.
#[derive(Debug, Clone)]
pub enum Limit {
    None,
    NumTimes(usize),
    EndDate(NaiveDateTime),
}

/// A job's schedule: either a single instant, or a cron recurrence bounded
/// by a [`Limit`].
#[derive(Clone)]
pub enum Recurrence {
    Once(DateTime<Utc>),
    Cron(Schedule, Limit),
}

/// `execution_flags` per §3: a small bitset. `NO_MORE_EXECUTIONS` is the
/// only flag named by the spec; the type leaves room to grow without
/// pulling in the `bitflags` crate for a single bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionFlags(u8);

impl ExecutionFlags {
    pub const NO_MORE_EXECUTIONS: ExecutionFlags = ExecutionFlags(1 << 0);

    pub const fn empty() -> Self {
        ExecutionFlags(0)
    }

    pub fn contains(self, other: ExecutionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ExecutionFlags) {
        self.0 |= other.0;
    }
}

/// A plain description of a job, independent of the scheduler's timezone
/// parameter. This is what a [`crate::repository::RepositoryAdapter`] hands
/// back from `load_all`, and what `Scheduler::add_job` builds internally.
pub struct JobSpec {
    pub key: JobKey,
    pub definer_principal: String,
    pub schema: String,
    pub recurrence: Recurrence,
    pub status: JobStatus,
    pub payload: Arc<dyn PayloadAdapter>,
}

mod job_internal {
    use super::*;

    /// The Job Record itself. Contains the schedule iterator and the
    /// volatile execution-state fields the manager mutates under the
    /// scheduler lock. Interprets the schedule with the supplied timezone,
    /// so all future datetimes this record produces are of that timezone.
    pub struct Job<T>
    where
        T: TimeZone + Send,
        T::Offset: Send,
    {
        key: JobKey,
        /// Monotonic insertion order, used only as the tie-break on equal
        /// `next_exec_time` (§4.2: "FIFO by insertion"). Never reused, even
        /// if the job is later removed — unlike a recycled id, this keeps
        /// the tie-break correct.
        sequence: u64,
        definer_principal: String,
        schema: String,
        next_exec_time: Option<DateTime<T>>,
        schedule: Box<dyn Iterator<Item = DateTime<T>> + Send>,
        payload: Arc<dyn PayloadAdapter>,
        status: JobStatus,
        flags: ExecutionFlags,
        running: bool,
        dropped: bool,
        thread_id_of_runner: Option<u64>,
    }

    impl<T> Job<T>
    where
        T: TimeZone + Clone + Copy + Send + 'static,
        T::Offset: Send,
    {
        pub fn new(key: JobKey, sequence: u64, spec_rest: JobSpecRest, timezone: T) -> Self {
            let JobSpecRest {
                definer_principal,
                schema,
                recurrence,
                status,
                payload,
            } = spec_rest;

            // Mirrors the teacher's `job_internal::Job::with_limit`: pull the
            // very first tick from the *unwrapped* iterator before applying
            // any limit, then wrap whatever ticks remain. Applying the limit
            // first would double-count the initial fire against it.
            let (mut schedule, limit): (Box<dyn Iterator<Item = DateTime<T>> + Send>, Option<Limit>) =
                match recurrence {
                    Recurrence::Once(at) => {
                        (Box::new(std::iter::once(at.with_timezone(&timezone))), None)
                    }
                    Recurrence::Cron(schedule, limit) => {
                        (Box::new(schedule.upcoming_owned(timezone)), Some(limit))
                    }
                };

            let next_exec_time = schedule.next();

            let schedule: Box<dyn Iterator<Item = DateTime<T>> + Send> = match limit {
                None | Some(Limit::None) => schedule,
                Some(Limit::NumTimes(n)) => Box::new(schedule.take(n.saturating_sub(1))),
                Some(Limit::EndDate(end_date)) => {
                    let end = Utc.from_utc_datetime(&end_date).timestamp();
                    Box::new(
                        schedule.take_while(move |dt| dt.with_timezone(&Utc).timestamp() < end),
                    )
                }
            };
            let mut flags = ExecutionFlags::empty();
            if next_exec_time.is_none() {
                flags.insert(ExecutionFlags::NO_MORE_EXECUTIONS);
            }

            Self {
                key,
                sequence,
                definer_principal,
                schema,
                next_exec_time,
                schedule,
                payload,
                status,
                flags,
                running: false,
                dropped: false,
                thread_id_of_runner: None,
            }
        }

        pub fn key(&self) -> &JobKey {
            &self.key
        }

        pub fn sequence(&self) -> u64 {
            self.sequence
        }

        pub fn definer_principal(&self) -> &str {
            &self.definer_principal
        }

        pub fn schema(&self) -> &str {
            &self.schema
        }

        pub fn payload(&self) -> Arc<dyn PayloadAdapter> {
            self.payload.clone()
        }

        /// Returns the next execution time of this job. `None` once the
        /// schedule is exhausted (`flags` will also carry
        /// `NO_MORE_EXECUTIONS`).
        pub fn next_exec_time(&self) -> Option<&DateTime<T>> {
            self.next_exec_time.as_ref()
        }

        /// Advances the schedule to the next fire at or after
        /// `max(now, previous next_fire_at + 1s)` per §4.3, draining any
        /// ticks that are already stale (the manager fell behind, or the
        /// wall clock jumped forward across a suspend). Sets
        /// `NO_MORE_EXECUTIONS` if the schedule is exhausted.
        pub fn advance_schedule(&mut self, now: DateTime<Utc>) {
            loop {
                self.next_exec_time = self.schedule.next();
                match &self.next_exec_time {
                    Some(t) if t.with_timezone(&Utc) <= now => continue,
                    _ => break,
                }
            }
            if self.next_exec_time.is_none() {
                self.flags.insert(ExecutionFlags::NO_MORE_EXECUTIONS);
            }
        }

        pub fn status(&self) -> JobStatus {
            self.status
        }

        pub fn set_status(&mut self, status: JobStatus) {
            self.status = status;
        }

        pub fn flags(&self) -> ExecutionFlags {
            self.flags
        }

        pub fn running(&self) -> bool {
            self.running
        }

        pub fn set_running(&mut self, running: bool) {
            self.running = running;
        }

        pub fn dropped(&self) -> bool {
            self.dropped
        }

        pub fn set_dropped(&mut self, dropped: bool) {
            self.dropped = dropped;
        }

        pub fn thread_id_of_runner(&self) -> Option<u64> {
            self.thread_id_of_runner
        }

        pub fn set_thread_id_of_runner(&mut self, id: Option<u64>) {
            self.thread_id_of_runner = id;
        }

        /// True once the record should be deleted the next time the
        /// manager observes it: either its recurrence is exhausted, it was
        /// explicitly disabled and has no more role to play, or it was
        /// dropped while running and that run has now finished.
        pub fn is_finished(&self) -> bool {
            self.flags.contains(ExecutionFlags::NO_MORE_EXECUTIONS)
        }
    }

    /// Everything a `JobSpec` carries except the key (kept separate so
    /// `Job::new` can take the scheduler-assigned sequence number
    /// alongside it).
    pub struct JobSpecRest {
        pub definer_principal: String,
        pub schema: String,
        pub recurrence: Recurrence,
        pub status: JobStatus,
        pub payload: Arc<dyn PayloadAdapter>,
    }

    impl From<JobSpec> for (JobKey, JobSpecRest) {
        fn from(spec: JobSpec) -> Self {
            (
                spec.key,
                JobSpecRest {
                    definer_principal: spec.definer_principal,
                    schema: spec.schema,
                    recurrence: spec.recurrence,
                    status: spec.status,
                    payload: spec.payload,
                },
            )
        }
    }

    impl<T> PartialEq for Job<T>
    where
        T: TimeZone + Send,
        T::Offset: Send,
    {
        fn eq(&self, other: &Self) -> bool {
            self.key == other.key && self.sequence == other.sequence
        }
    }

    impl<T> Eq for Job<T>
    where
        T: TimeZone + Send,
        T::Offset: Send,
    {
    }

    impl<T> PartialOrd for Job<T>
    where
        T: TimeZone + Send,
        T::Offset: Send,
    {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    impl<T> Ord for Job<T>
    where
        T: TimeZone + Send,
        T::Offset: Send,
    {
        /// Orders by `next_exec_time` first, tie-broken by insertion order
        /// (§4.2). A job with no more execution times sorts as `Less` so it
        /// bubbles to the top of the (max-heap-via-`Reverse`) queue and gets
        /// sifted out by the manager as soon as possible, the same trick
        /// the teacher's `job_internal::Job::cmp` uses.
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            use std::cmp::Ordering;

            match (&self.next_exec_time, &other.next_exec_time) {
                (Some(a), Some(b)) => a
                    .partial_cmp(b)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| self.sequence.cmp(&other.sequence)),
                (None, None) => self.sequence.cmp(&other.sequence),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            }
        }
    }
}

pub use job_internal::{Job, JobSpecRest};
