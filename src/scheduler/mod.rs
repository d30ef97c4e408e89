//! Component E: the scheduler core (§4.5, §4.6, §4.7).
//!
//! Owns the event queue, the scheduler lock, the three named condition
//! variables, and the manager thread that drives the whole state machine.
//! Everything else in the crate (clock, queue, job, handoff, adapters) is a
//! leaf this module wires together.

pub mod state;

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::diagnostics::LockDiagnostics;
use crate::error::{ControlError, DescheduleError};
use crate::handoff::Handoff;
use crate::identity::IdentityAdapter;
use crate::job::{Job, JobKey, JobSpec, JobStatus};
use crate::payload::{ExecResult, PayloadAdapter as _};
use crate::queue::EventQueue;
use crate::repository::{RepositoryAdapter, RepositoryContext};
use crate::spawner::WorkerSpawner;
use chrono::{DateTime, TimeZone, Utc};
use fxhash::FxHasher64;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

pub use state::{CondvarName, SchedulerState};

type WorkerId = u64;
type FxMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher64>>;

/// The pieces the manager and every control-surface call reach through.
/// Split out of [`Scheduler`] itself so a worker closure can hold an
/// `Arc<SharedInner<T>>` without holding the handle type the caller sees.
struct SharedInner<T>
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    lock: Mutex<Inner<T>>,
    new_work: Condvar,
    started_or_stopped: Condvar,
    suspend_or_resume: Condvar,
    clock: Arc<dyn Clock>,
    spawner: Arc<dyn WorkerSpawner>,
    repository: Arc<dyn RepositoryAdapter>,
    identity: Arc<dyn IdentityAdapter>,
    config: SchedulerConfig,
    timezone: T,
}

/// Everything protected by the scheduler lock (§5: "exactly one lock").
struct Inner<T>
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    state: SchedulerState,
    queue: EventQueue<T>,
    /// Jobs pulled out of the queue's rotation while a worker still holds
    /// them: a one-shot/disabled/exhausted job after it has fired, or any
    /// job dropped while running. Kept here purely so `on_worker_finish`
    /// and a racing `drop_job` can still find the record by identity; it
    /// is never consulted by the manager's fire loop.
    in_flight: FxMap<JobKey, Job<T>>,
    workers: FxMap<WorkerId, crate::spawner::WorkerTaskHandle>,
    next_worker_id: WorkerId,
    manager_thread: Option<JoinHandle<()>>,
    diagnostics: LockDiagnostics,
    start_suspended_requested: bool,
    /// Bumped by the manager each time it finishes acting on a suspend or
    /// resume transition (entering the suspended wait, or completing
    /// `recalculate_all` after a resume). `suspend`/`resume` wait for this
    /// to move past the value it observed before returning, per §4.7's
    /// "wait on suspend_or_resume for acknowledgement".
    suspend_generation: u64,
    /// Test/diagnostic hook for the Open Question in §9: an external
    /// cancel of the manager is modeled as one flag the loop observes and
    /// treats as an implicit suspend, rather than a real signal delivery
    /// mechanism (out of scope for a single-process embedded scheduler).
    cancel_requested: bool,
}

/// A handle to a running (or not-yet-started) scheduler instance. Cheap to
/// clone; every clone shares the same lock, queue, and manager thread.
pub struct Scheduler<T = Utc>
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    shared: Arc<SharedInner<T>>,
}

impl<T> Clone for Scheduler<T>
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Scheduler<Utc> {
    /// A UTC scheduler with the default config, a system clock, a Tokio
    /// spawner bound to `runtime`, and no-op repository/identity adapters.
    /// The convenient entry point for a demo binary or a test.
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self::with_timezone(
            Utc,
            SchedulerConfig::default(),
            Arc::new(crate::clock::SystemClock),
            Arc::new(crate::spawner::TokioSpawner::new(runtime)),
            Arc::new(crate::repository::NullRepository),
            Arc::new(crate::identity::NoopIdentityAdapter),
        )
    }
}

impl<T> Scheduler<T>
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    /// Full constructor: every collaborator named in §6 is supplied
    /// explicitly, so tests can swap in a fake clock or a failing spawner
    /// (§8 boundary scenario 5) without touching production wiring.
    pub fn with_timezone(
        timezone: T,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        spawner: Arc<dyn WorkerSpawner>,
        repository: Arc<dyn RepositoryAdapter>,
        identity: Arc<dyn IdentityAdapter>,
    ) -> Self {
        let inner = Inner {
            state: SchedulerState::Uninitialized,
            queue: EventQueue::new(timezone),
            in_flight: FxMap::default(),
            workers: FxMap::default(),
            next_worker_id: 0,
            manager_thread: None,
            diagnostics: LockDiagnostics::default(),
            start_suspended_requested: false,
            cancel_requested: false,
            suspend_generation: 0,
        };
        Self {
            shared: Arc::new(SharedInner {
                lock: Mutex::new(inner),
                new_work: Condvar::new(),
                started_or_stopped: Condvar::new(),
                suspend_or_resume: Condvar::new(),
                clock,
                spawner,
                repository,
                identity,
                config,
                timezone,
            }),
        }
    }

    /// `Uninitialized -> Initialized` (§4.5). A no-op once past
    /// `Uninitialized`; `start`/`start_suspended` call this implicitly so
    /// callers are not required to sequence it themselves.
    pub fn init(&self) {
        let mut guard = self.lock();
        if guard.state == SchedulerState::Uninitialized {
            guard.state = SchedulerState::Initialized;
        }
    }

    pub fn start(&self) -> Result<(), ControlError> {
        self.start_inner(false)
    }

    pub fn start_suspended(&self) -> Result<(), ControlError> {
        self.start_inner(true)
    }

    fn start_inner(&self, suspended: bool) -> Result<(), ControlError> {
        let mut guard = self.lock();
        match guard.state {
            SchedulerState::Uninitialized => guard.state = SchedulerState::Initialized,
            // "CantStart -> start caller observed -> Initialized (caller
            // resets)": we fold the reset and the retry into one call so a
            // caller doesn't need to invoke `start` twice after a failure.
            SchedulerState::CantStart => guard.state = SchedulerState::Initialized,
            SchedulerState::Initialized => {}
            SchedulerState::Running | SchedulerState::Suspended => {
                return Err(ControlError::AlreadyRunning)
            }
            SchedulerState::Commencing | SchedulerState::InShutdown => {
                return Err(ControlError::AlreadyRunning)
            }
        }

        guard.state = SchedulerState::Commencing;
        guard.start_suspended_requested = suspended;
        log::info!(target: "scheduler::Scheduler::start", "commencing start (suspended={suspended})");

        let shared = self.shared.clone();
        guard.manager_thread = Some(std::thread::spawn(move || manager_loop(shared)));

        loop {
            guard = wait(&self.shared.started_or_stopped, guard, CondvarName::StartedOrStopped);
            match guard.state {
                SchedulerState::Running | SchedulerState::Suspended => return Ok(()),
                SchedulerState::CantStart => return Err(ControlError::CannotStart),
                _ => continue,
            }
        }
    }

    pub fn suspend(&self) -> Result<(), ControlError> {
        let mut guard = self.lock();
        match guard.state {
            SchedulerState::Suspended => Ok(()),
            SchedulerState::Running => {
                guard.state = SchedulerState::Suspended;
                log::info!(target: "scheduler::Scheduler::suspend", "suspending");
                let starting_generation = guard.suspend_generation;
                self.shared.new_work.notify_all();
                self.shared.suspend_or_resume.notify_all();
                while guard.suspend_generation == starting_generation {
                    guard = wait(&self.shared.suspend_or_resume, guard, CondvarName::SuspendOrResume);
                }
                Ok(())
            }
            _ => Err(ControlError::NotRunning),
        }
    }

    pub fn resume(&self) -> Result<(), ControlError> {
        let mut guard = self.lock();
        match guard.state {
            SchedulerState::Running => Ok(()),
            SchedulerState::Suspended => {
                guard.state = SchedulerState::Running;
                log::info!(target: "scheduler::Scheduler::resume", "resuming");
                let starting_generation = guard.suspend_generation;
                self.shared.suspend_or_resume.notify_all();
                while guard.suspend_generation == starting_generation {
                    guard = wait(&self.shared.suspend_or_resume, guard, CondvarName::SuspendOrResume);
                }
                Ok(())
            }
            _ => Err(ControlError::NotRunning),
        }
    }

    pub fn stop(&self) -> Result<(), ControlError> {
        let mut guard = self.lock();
        if !matches!(guard.state, SchedulerState::Running | SchedulerState::Suspended) {
            return Err(ControlError::NotRunning);
        }
        guard.state = SchedulerState::InShutdown;
        log::info!(target: "scheduler::Scheduler::stop", "stopping, waiting for manager to drain workers");
        self.shared.new_work.notify_all();
        self.shared.suspend_or_resume.notify_all();

        loop {
            guard = wait(&self.shared.started_or_stopped, guard, CondvarName::StartedOrStopped);
            if guard.state == SchedulerState::Initialized {
                break;
            }
        }

        let handle = guard.manager_thread.take();
        drop(guard);
        if let Some(handle) = handle {
            if let Err(e) = handle.join() {
                log::error!(target: "scheduler::Scheduler::stop", "manager thread panicked: {e:?}");
            }
        }
        log::info!(target: "scheduler::Scheduler::stop", "stopped");
        Ok(())
    }

    /// A convenience `stop(); start()` the way the teacher's `restart`
    /// does, bubbling whichever call fails first.
    pub fn restart(&self) -> Result<(), ControlError> {
        match self.stop() {
            Ok(()) | Err(ControlError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start()
    }

    pub fn add_job(&self, spec: JobSpec) {
        let (key, rest) = spec.into();
        let mut guard = self.lock();
        log::info!(target: "scheduler::Scheduler::add_job", "adding job {key}");
        guard.queue.insert(key, rest);
        self.shared.new_work.notify_all();
    }

    /// §4.7 "add/update": mutate an already-scheduled job's record in
    /// place — e.g. a DDL `ALTER EVENT` flipping `status`, or replacing its
    /// definer principal — without a drop-then-add round trip. Reaches the
    /// record wherever it currently lives: the live queue, or `in_flight`
    /// if a worker is mid-execution against it.
    pub fn update_job(
        &self,
        key: &JobKey,
        update: impl FnOnce(&mut Job<T>),
    ) -> Result<(), DescheduleError> {
        let mut guard = self.lock();
        if let Some(job) = guard.in_flight.get_mut(key) {
            update(job);
        } else if guard.queue.with_job_mut(key, update).is_none() {
            return Err(DescheduleError::JobDoesNotExist);
        }
        log::info!(target: "scheduler::Scheduler::update_job", "updated job {key}");
        self.shared.new_work.notify_all();
        Ok(())
    }

    pub fn drop_job(&self, key: &JobKey) -> Result<(), DescheduleError> {
        let mut guard = self.lock();
        let result = drop_job_locked(&mut guard, key);
        if result.is_ok() {
            log::info!(target: "scheduler::Scheduler::drop_job", "dropped job {key}");
            self.shared.new_work.notify_all();
        }
        result
    }

    /// Notifies the manager that the queue changed out from under it
    /// without going through `add_job`/`update_job`/`drop_job` (§6:
    /// `queue_changed` is part of the control surface in its own right) —
    /// a caller that already holds the scheduler lock via some other path
    /// and mutated a record directly can use this instead of duplicating
    /// `update_job`'s locking.
    pub fn queue_changed(&self) {
        self.shared.new_work.notify_all();
    }

    /// The timezone every job's recurrence is interpreted against, as
    /// supplied to [`Scheduler::with_timezone`].
    pub fn timezone(&self) -> T {
        self.shared.timezone
    }

    pub fn active(&self) -> bool {
        matches!(
            self.lock().state,
            SchedulerState::Running | SchedulerState::Suspended
        )
    }

    pub fn workers_count(&self) -> usize {
        self.lock().workers.len()
    }

    /// Test-only hook exercising the Open Question in §9: simulate an
    /// external cancel of the manager thread and observe that it degrades
    /// to `Suspended` rather than tearing the manager down.
    pub fn simulate_external_cancel(&self) {
        let mut guard = self.lock();
        if matches!(guard.state, SchedulerState::Running | SchedulerState::Suspended) {
            guard.cancel_requested = true;
            self.shared.new_work.notify_all();
        }
    }

    /// §6's diagnostic surface: a two-column `(Name, Value)` stream. Row
    /// set and names are part of the external contract and must not
    /// change shape across builds.
    pub fn dump_status(&self) -> Vec<(String, String)> {
        let locked_elsewhere = self.shared.lock.try_lock().is_err();
        let guard = self.lock();
        if guard.state == SchedulerState::Uninitialized {
            return vec![("state".to_string(), guard.state.to_string())];
        }
        let mut rows = vec![("state".to_string(), guard.state.to_string())];
        rows.extend(guard.diagnostics.rows());
        rows.push(("workers_count".to_string(), guard.workers.len().to_string()));
        rows.push(("queue.elements".to_string(), guard.queue.count().to_string()));
        rows.push(("scheduler data locked".to_string(), locked_elsewhere.to_string()));
        rows
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        let mut guard = self
            .shared
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.diagnostics.mark_locked();
        guard
    }
}

/// Drops `key` per §4.7: remove it from wherever it lives, marking it
/// `dropped=true` instead of deleting outright if a worker is currently
/// executing it (deletion is deferred to `on_worker_finish`).
fn drop_job_locked<T>(inner: &mut Inner<T>, key: &JobKey) -> Result<(), DescheduleError>
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    if let Some(mut job) = inner.queue.remove_by_identity(key) {
        if job.running() {
            job.set_dropped(true);
            inner.in_flight.insert(key.clone(), job);
        }
        // else: not running, simply removed; nothing further to delete
        // here, since persisted-row deletion belongs to the DDL caller
        // that invoked `drop_job` in the first place (§6: the repository
        // adapter's `drop_persisted` is reserved for a worker's own
        // one-shot self-cleanup, never for an external drop).
        return Ok(());
    }
    if let Some(existing) = inner.in_flight.get_mut(key) {
        if existing.dropped() {
            return Err(DescheduleError::AlreadyScheduled);
        }
        existing.set_dropped(true);
        return Ok(());
    }
    Err(DescheduleError::JobDoesNotExist)
}

/// The worker epilogue's callback into the scheduler (§4.3:
/// `on_worker_finish`). Clears `running`, retires the worker from the
/// census, and reports whether the caller (the worker) should delete the
/// job's persisted definition.
fn on_worker_finished<T>(shared: &SharedInner<T>, key: &JobKey, worker_id: WorkerId) -> bool
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    let mut guard = shared
        .lock
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    guard.diagnostics.mark_locked();
    guard.workers.remove(&worker_id);

    let should_delete = if let Some(job) = guard.in_flight.remove(key) {
        // Pulled out of rotation: either one-shot/exhausted/disabled, or
        // dropped while running. Either way its role here is over.
        drop(job);
        true
    } else {
        guard
            .queue
            .with_job_mut(key, |job| {
                job.set_running(false);
                job.set_thread_id_of_runner(None);
                job.is_finished() || matches!(job.status(), JobStatus::Disabled) || job.dropped()
            })
            .unwrap_or(false)
    };

    if should_delete {
        guard.queue.remove_by_identity(key);
    }
    shared.new_work.notify_all();
    should_delete
}

/// The manager thread's body (§4.6). Boots by loading jobs from the
/// repository, transitions to `Running`/`Suspended`, then loops until
/// `InShutdown`.
fn manager_loop<T>(shared: Arc<SharedInner<T>>)
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    let mut guard = shared.lock.lock().unwrap_or_else(PoisonError::into_inner);
    guard.diagnostics.mark_locked();

    match shared.repository.load_all(&RepositoryContext) {
        Err(e) => {
            log::error!(target: "scheduler::Manager::run", "boot failed, repository load_all errored: {e}");
            guard.state = SchedulerState::CantStart;
            shared.started_or_stopped.notify_all();
            return;
        }
        Ok(specs) => {
            for spec in specs {
                let (key, rest) = spec.into();
                guard.queue.insert(key, rest);
            }
        }
    }

    guard.state = if guard.start_suspended_requested {
        SchedulerState::Suspended
    } else {
        SchedulerState::Running
    };
    log::info!(target: "scheduler::Manager::run", "manager booted into {}", guard.state);
    shared.started_or_stopped.notify_all();

    'outer: loop {
        if guard.cancel_requested {
            guard.cancel_requested = false;
            if guard.state != SchedulerState::InShutdown {
                log::warn!(target: "scheduler::Manager::run", "external cancel observed, degrading to Suspended (§9 open question)");
                guard.state = SchedulerState::Suspended;
            }
        }

        if guard.state == SchedulerState::Suspended {
            // Acknowledge the suspend transition before parking: the caller
            // is waiting on this generation bump to know the manager has
            // actually stopped considering new fires.
            guard.suspend_generation = guard.suspend_generation.wrapping_add(1);
            shared.suspend_or_resume.notify_all();

            while guard.state == SchedulerState::Suspended {
                guard = wait(&shared.suspend_or_resume, guard, CondvarName::SuspendOrResume);
            }
            if guard.state == SchedulerState::Running {
                let now = now_dt(&*shared.clock);
                log::debug!(target: "scheduler::Manager::run", "resumed, recalculating schedule against {now}");
                guard.queue.recalculate_all(now);
                guard.suspend_generation = guard.suspend_generation.wrapping_add(1);
                shared.suspend_or_resume.notify_all();
            }
        }

        if guard.state == SchedulerState::InShutdown {
            break 'outer;
        }

        while guard.queue.empty() {
            guard = wait(&shared.new_work, guard, CondvarName::NewWork);
            if !matches!(guard.state, SchedulerState::Running | SchedulerState::Suspended) {
                break;
            }
        }

        if guard.state == SchedulerState::InShutdown {
            break 'outer;
        }
        if guard.state == SchedulerState::Suspended {
            continue 'outer;
        }

        let now_secs = shared.clock.now_utc_seconds();
        let now = now_dt(&*shared.clock);

        let top_status = match guard.queue.top() {
            Some(top) => top.status(),
            None => continue 'outer,
        };
        if top_status == JobStatus::Disabled {
            if let Some(job) = guard.queue.remove_top() {
                log::debug!(target: "scheduler::Manager::run", "removing disabled job {}", job.key());
            }
            continue 'outer;
        }

        let top_delay = guard
            .queue
            .top()
            .and_then(|top| top.next_exec_time())
            .map(|t| t.with_timezone(&Utc).timestamp() - now_secs);

        match top_delay {
            None => continue 'outer,
            Some(delay) if delay > 0 => {
                let wait_for = std::time::Duration::from_secs(delay as u64) + shared.config.poll_padding;
                let (next_guard, _) =
                    wait_timeout(&shared.new_work, guard, wait_for, CondvarName::NewWork);
                guard = next_guard;
                continue 'outer;
            }
            Some(_due_or_overdue) => {
                match execute_top(&mut guard, &shared, now) {
                    ExecuteOutcome::CannotFork => break 'outer,
                    ExecuteOutcome::Spawned | ExecuteOutcome::Skipped | ExecuteOutcome::Continue => {}
                }
            }
        }
    }

    log::info!(target: "scheduler::Manager::run", "manager loop exiting, draining workers");
    guard.diagnostics.mark_unlocked();
    drop(guard);
    drain_workers(&shared);

    let mut guard = shared.lock.lock().unwrap_or_else(PoisonError::into_inner);
    guard.diagnostics.mark_locked();
    guard.state = SchedulerState::Initialized;
    guard.start_suspended_requested = false;
    shared.started_or_stopped.notify_all();
    log::info!(target: "scheduler::Manager::run", "manager stopped, workers drained");
}

enum ExecuteOutcome {
    Spawned,
    Skipped,
    Continue,
    CannotFork,
}

/// §4.6's `execute_top`: spawn a worker for the due job at the top of the
/// queue, wait for its startup acknowledgement, and leave the queue in
/// whichever shape matches the job's fate (removed, reinserted for its
/// next fire, or parked in `in_flight` pending worker completion).
fn execute_top<T>(
    inner: &mut MutexGuard<'_, Inner<T>>,
    shared: &Arc<SharedInner<T>>,
    now: DateTime<Utc>,
) -> ExecuteOutcome
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    let mut job = match inner.queue.remove_top() {
        Some(job) => job,
        None => return ExecuteOutcome::Continue,
    };

    if job.running() {
        log::warn!(target: "scheduler::Manager::execute_top", "skip: {} is already running", job.key());
        job.advance_schedule(now);
        let disabled_or_finished =
            job.is_finished() || matches!(job.status(), JobStatus::Disabled);
        if disabled_or_finished {
            inner.in_flight.insert(job.key().clone(), job);
        } else {
            inner.queue.reinsert(job);
        }
        return ExecuteOutcome::Skipped;
    }

    let key = job.key().clone();
    let worker_id = inner.next_worker_id;
    inner.next_worker_id += 1;
    job.set_running(true);
    job.set_thread_id_of_runner(Some(worker_id));

    job.advance_schedule(now);
    let disabled_or_finished = job.is_finished() || matches!(job.status(), JobStatus::Disabled);
    let payload = job.payload();
    let principal = job.definer_principal().to_string();
    let schema = job.schema().to_string();

    let handoff = Handoff::new();
    let task_handoff = handoff.clone();
    let task_shared = shared.clone();
    let task_key = key.clone();

    let task: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
        Box::pin(async move {
            let identity_handle = task_shared.identity.assume(&principal, &schema);
            task_handoff.signal_started();

            let result = payload.execute().await;
            match result {
                ExecResult::Ok => {
                    log::info!(target: "scheduler::Worker::run", "{task_key} finished");
                }
                ExecResult::CompileError => {
                    log::warn!(target: "scheduler::Worker::run", "{task_key} failed to compile, skipping this fire");
                }
                ExecResult::UnsupportedPrecision => {
                    log::warn!(target: "scheduler::Worker::run", "{task_key} requested sub-second precision, skipping this fire");
                }
                ExecResult::Other(code) => {
                    log::warn!(target: "scheduler::Worker::run", "{task_key} finished with code {code}");
                }
            }

            task_shared.identity.release(identity_handle);

            let should_delete = on_worker_finished(&task_shared, &task_key, worker_id);
            if should_delete {
                if let Err(e) = task_shared
                    .repository
                    .drop_persisted(&task_key, &RepositoryContext)
                {
                    log::warn!(target: "scheduler::Worker::run", "failed to drop persisted row for {task_key}: {e}");
                }
            }
        });

    match shared.spawner.spawn(task) {
        None => {
            log::error!(target: "scheduler::Manager::execute_top", "cannot fork worker for {key}, shutting down");
            ExecuteOutcome::CannotFork
        }
        Some(handle) => {
            inner.workers.insert(worker_id, handle);
            if disabled_or_finished {
                inner.in_flight.insert(key.clone(), job);
            } else {
                inner.queue.reinsert(job);
            }

            if !handoff.wait_started(shared.config.handoff_wait) {
                log::warn!(target: "scheduler::Manager::execute_top", "timed out waiting for {key}'s worker to acknowledge startup");
            }
            ExecuteOutcome::Spawned
        }
    }
}

/// §4.6's shutdown tail: snapshot nothing extra (the census lives in
/// `Inner::workers`), and poll `workers_count()` until it drains to zero.
/// No deadline is imposed (§5): a worker's cooperative response to
/// cancellation is entirely the out-of-scope payload adapter's business.
fn drain_workers<T>(shared: &Arc<SharedInner<T>>)
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    loop {
        let count = shared
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .workers
            .len();
        if count == 0 {
            break;
        }
        std::thread::sleep(shared.config.worker_drain_poll_interval);
    }
}

fn now_dt(clock: &dyn Clock) -> DateTime<Utc> {
    Utc.timestamp_opt(clock.now_utc_seconds(), 0)
        .single()
        .expect("a UTC second-granularity timestamp is never ambiguous")
}

/// Waits on `cond`, marking the diagnostic lock bookkeeping across the
/// implicit unlock/relock a condvar wait performs.
fn wait<'a, T>(
    cond: &Condvar,
    mut guard: MutexGuard<'a, Inner<T>>,
    which: CondvarName,
) -> MutexGuard<'a, Inner<T>>
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    guard.diagnostics.set_waiting(Some(which));
    guard.diagnostics.mark_unlocked();
    let mut guard = cond.wait(guard).unwrap_or_else(PoisonError::into_inner);
    guard.diagnostics.mark_locked();
    guard.diagnostics.set_waiting(None);
    guard
}

fn wait_timeout<'a, T>(
    cond: &Condvar,
    mut guard: MutexGuard<'a, Inner<T>>,
    duration: std::time::Duration,
    which: CondvarName,
) -> (MutexGuard<'a, Inner<T>>, bool)
where
    T: TimeZone + Copy + Clone + Send + Sync + 'static,
    T::Offset: Send,
{
    guard.diagnostics.set_waiting(Some(which));
    guard.diagnostics.mark_unlocked();
    let (mut guard, result) = cond
        .wait_timeout(guard, duration)
        .unwrap_or_else(PoisonError::into_inner);
    guard.diagnostics.mark_locked();
    guard.diagnostics.set_waiting(None);
    (guard, result.timed_out())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::job::{JobStatus, Recurrence};
    use crate::payload::{AsyncFn, ClosurePayload, ExecResult};
    use crate::repository::NullRepository;
    use crate::spawner::FailingSpawner;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn noop_payload() -> Arc<dyn crate::payload::PayloadAdapter> {
        struct Noop;
        impl AsyncFn for Noop {
            fn call(&self) -> futures::future::BoxFuture<'static, ExecResult> {
                Box::pin(async { ExecResult::Ok })
            }
        }
        Arc::new(ClosurePayload::new(Noop))
    }

    fn counting_payload(counter: Arc<AtomicUsize>) -> Arc<dyn crate::payload::PayloadAdapter> {
        struct Count(Arc<AtomicUsize>);
        impl AsyncFn for Count {
            fn call(&self) -> futures::future::BoxFuture<'static, ExecResult> {
                let counter = self.0.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ExecResult::Ok
                })
            }
        }
        Arc::new(ClosurePayload::new(Count(counter)))
    }

    fn one_shot_spec(name: &str, in_secs: i64, payload: Arc<dyn crate::payload::PayloadAdapter>) -> JobSpec {
        JobSpec {
            key: JobKey::new("db", name),
            definer_principal: "root".into(),
            schema: "db".into(),
            recurrence: Recurrence::Once(Utc::now() + chrono::Duration::seconds(in_secs)),
            status: JobStatus::Enabled,
            payload,
        }
    }

    fn test_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn start_stop_round_trip() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        scheduler.start().unwrap();
        assert!(scheduler.active());
        scheduler.stop().unwrap();
        assert!(!scheduler.active());
    }

    #[test]
    fn stop_while_not_running_is_not_running() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        assert_eq!(scheduler.stop(), Err(ControlError::NotRunning));
    }

    #[test]
    fn a_due_job_fires_and_is_deleted_once_one_shot() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.add_job(one_shot_spec("once", 0, counting_payload(counter.clone())));
        scheduler.start().unwrap();

        std::thread::sleep(Duration::from_millis(1200));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.lock().queue.count(), 0);
        scheduler.stop().unwrap();
    }

    #[test]
    fn suspend_then_resume_round_trips_through_running() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        scheduler.start().unwrap();
        scheduler.suspend().unwrap();
        assert_eq!(scheduler.lock().state, SchedulerState::Suspended);
        scheduler.suspend().unwrap(); // idempotent
        scheduler.resume().unwrap();
        assert_eq!(scheduler.lock().state, SchedulerState::Running);
        scheduler.resume().unwrap(); // idempotent
        scheduler.stop().unwrap();
    }

    #[test]
    fn spawn_failure_transitions_to_cant_fork_then_recovers() {
        let rt = test_runtime();
        let scheduler = Scheduler::with_timezone(
            Utc,
            SchedulerConfig::default(),
            Arc::new(SystemClock),
            Arc::new(FailingSpawner),
            Arc::new(NullRepository),
            Arc::new(crate::identity::NoopIdentityAdapter),
        );
        scheduler.add_job(one_shot_spec("doomed", 0, noop_payload()));
        scheduler.start().unwrap();
        std::thread::sleep(Duration::from_millis(500));
        assert!(!scheduler.active());

        // A fresh start succeeds on a real spawner after the scheduler
        // rebuilds its internals (§8 boundary scenario 5).
        let scheduler2 = Scheduler::new(rt.handle().clone());
        scheduler2.start().unwrap();
        scheduler2.stop().unwrap();
    }

    #[test]
    fn drop_never_fired_job_leaves_queue_unchanged() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        let key = JobKey::new("db", "later");
        scheduler.add_job(one_shot_spec("later", 3600, noop_payload()));
        assert_eq!(scheduler.lock().queue.count(), 1);
        scheduler.drop_job(&key).unwrap();
        assert_eq!(scheduler.lock().queue.count(), 0);
    }

    #[test]
    fn disabled_job_at_top_is_removed_without_spawning() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.add_job(JobSpec {
            key: JobKey::new("db", "disabled"),
            definer_principal: "root".into(),
            schema: "db".into(),
            recurrence: Recurrence::Once(Utc::now() - chrono::Duration::seconds(5)),
            status: JobStatus::Disabled,
            payload: counting_payload(counter.clone()),
        });
        scheduler.start().unwrap();
        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.lock().queue.count(), 0);
        scheduler.stop().unwrap();
    }

    #[test]
    fn disabling_a_live_job_via_update_stops_it_from_firing() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        let counter = Arc::new(AtomicUsize::new(0));
        let key = JobKey::new("db", "will_be_disabled");
        scheduler.add_job(JobSpec {
            key: key.clone(),
            definer_principal: "root".into(),
            schema: "db".into(),
            recurrence: Recurrence::Once(Utc::now() - chrono::Duration::seconds(5)),
            status: JobStatus::Enabled,
            payload: counting_payload(counter.clone()),
        });

        scheduler
            .update_job(&key, |job| job.set_status(JobStatus::Disabled))
            .unwrap();

        scheduler.start().unwrap();
        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.lock().queue.count(), 0);
        scheduler.stop().unwrap();

        assert_eq!(
            scheduler.update_job(&JobKey::new("db", "never_added"), |_| {}),
            Err(DescheduleError::JobDoesNotExist)
        );
    }

    #[test]
    fn two_due_at_same_instant_both_fire_and_queue_drains() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        let counter = Arc::new(AtomicUsize::new(0));
        let at = Utc::now() + chrono::Duration::seconds(1);
        scheduler.add_job(JobSpec {
            key: JobKey::new("db", "a"),
            definer_principal: "root".into(),
            schema: "db".into(),
            recurrence: Recurrence::Once(at),
            status: JobStatus::Enabled,
            payload: counting_payload(counter.clone()),
        });
        scheduler.add_job(JobSpec {
            key: JobKey::new("db", "b"),
            definer_principal: "root".into(),
            schema: "db".into(),
            recurrence: Recurrence::Once(at),
            status: JobStatus::Enabled,
            payload: counting_payload(counter.clone()),
        });
        scheduler.start().unwrap();
        std::thread::sleep(Duration::from_millis(2000));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.lock().queue.count(), 0);
        scheduler.stop().unwrap();
    }

    #[test]
    fn external_cancel_degrades_to_suspended() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        scheduler.start().unwrap();
        scheduler.simulate_external_cancel();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(scheduler.lock().state, SchedulerState::Suspended);
        scheduler.stop().unwrap();
    }

    #[test]
    fn dump_status_reports_the_contractual_rows() {
        let rt = test_runtime();
        let scheduler = Scheduler::new(rt.handle().clone());
        scheduler.start().unwrap();
        let rows = scheduler.dump_status();
        let names: Vec<_> = rows.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"state"));
        assert!(names.contains(&"workers_count"));
        assert!(names.contains(&"queue.elements"));
        assert!(names.contains(&"scheduler data locked"));
        scheduler.stop().unwrap();
    }

    /// A non-UTC `T` still fires on time, the way the teacher's own
    /// doctests exercise `Scheduler::with_timezone(chrono_tz::...)`.
    #[test]
    fn fires_correctly_under_a_non_utc_timezone() {
        use rand::Rng;

        let rt = test_runtime();
        let scheduler = Scheduler::with_timezone(
            chrono_tz::America::Chicago,
            SchedulerConfig::default(),
            Arc::new(SystemClock),
            Arc::new(crate::spawner::TokioSpawner::new(rt.handle().clone())),
            Arc::new(NullRepository),
            Arc::new(crate::identity::NoopIdentityAdapter),
        );
        let counter = Arc::new(AtomicUsize::new(0));
        // A little jitter on the fire delay, same spirit as the teacher's
        // own randomized test timings.
        let delay_secs = rand::thread_rng().gen_range(1..3);
        let at = chrono::Utc::now() + chrono::Duration::seconds(delay_secs);
        scheduler.add_job(JobSpec {
            key: JobKey::new("db", "chicago"),
            definer_principal: "root".into(),
            schema: "db".into(),
            recurrence: Recurrence::Once(at),
            status: JobStatus::Enabled,
            payload: counting_payload(counter.clone()),
        });
        scheduler.start().unwrap();
        std::thread::sleep(Duration::from_millis((delay_secs as u64) * 1000 + 1000));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        scheduler.stop().unwrap();
    }
}
