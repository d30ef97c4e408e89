//! Payload adapter (§6): compiling and executing a job's body is explicitly
//! out of scope for the core. A `PayloadAdapter` is the seam the real
//! compiler/executor plugs into; jobs in this crate are otherwise just
//! schedules.
//!
//! Mirrors the teacher's `AsyncFn` trait-object-for-closures trick (adapted
//! from a stackoverflow answer the teacher itself credits) so that callers
//! can still hand the scheduler an `async { ... }` closure directly, the way
//! `job_scheduler::Scheduler::add_job` does.

use futures::future::BoxFuture;
use futures::Future;

/// Classification of how a single firing went, per §6/§7. This is what a
/// [`PayloadAdapter`] reports back to the manager so it can route the
/// error taxonomy: `CompileError`/`UnsupportedPrecision` are permanent
/// per-job failures (logged, schedule still advances), `Other` carries
/// an adapter-defined code for anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    Ok,
    CompileError,
    UnsupportedPrecision,
    Other(i32),
}

impl ExecResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExecResult::Ok)
    }
}

/// Adapted from Ibraheem Ahmed's solution on https://stackoverflow.com, Feb 5, 2021.
/// An implementation to store async functions as trait objects in structs.
pub trait AsyncFn {
    fn call(&self) -> BoxFuture<'static, ExecResult>;
}

impl<T, F> AsyncFn for T
where
    T: (FnOnce() -> F) + Clone + Send + 'static,
    F: Future<Output = ExecResult> + Send + 'static,
{
    fn call(&self) -> BoxFuture<'static, ExecResult> {
        Box::pin(self.clone()())
    }
}

/// The external payload-execution interface named in §6:
/// `execute(job, context) -> ExecResult`.
///
/// Job Records never implement this themselves (§4.3: "the Job Record
/// itself owns only the schedule arithmetic and the flags") — a
/// `PayloadAdapter` is what the repository/compiler subsystem hands the
/// scheduler when a job is created.
pub trait PayloadAdapter: Send + Sync {
    fn execute(&self) -> BoxFuture<'static, ExecResult>;
}

/// Adapts any [`AsyncFn`] closure (the ergonomic entry point jobs are
/// usually created with) into a [`PayloadAdapter`].
pub struct ClosurePayload<C> {
    command: C,
}

impl<C> ClosurePayload<C>
where
    C: AsyncFn + Send + Sync + 'static,
{
    pub fn new(command: C) -> Self {
        Self { command }
    }
}

impl<C> PayloadAdapter for ClosurePayload<C>
where
    C: AsyncFn + Send + Sync + 'static,
{
    fn execute(&self) -> BoxFuture<'static, ExecResult> {
        self.command.call()
    }
}

/// The plain `Result<(), Box<dyn Error + Send + Sync>>` jobs most naturally
/// return (user closures, like the teacher's). Converted into an
/// [`ExecResult`] at the boundary so the manager's error taxonomy (§7) only
/// ever has to deal with one type.
pub type JobResult =
    core::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Wraps a closure returning [`JobResult`] (the teacher's native job shape)
/// so it can be scheduled directly, without callers having to think about
/// `ExecResult` classification themselves. Any `Err` is reported as
/// `ExecResult::Other(1)`; finer-grained classification (`CompileError`,
/// `UnsupportedPrecision`) is reserved for adapters that actually compile
/// and run a stored procedure body.
#[derive(Clone)]
pub struct UserJob<C> {
    inner: C,
}

impl<C> UserJob<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C, F> AsyncFn for UserJob<C>
where
    C: (FnOnce() -> F) + Clone + Send + 'static,
    F: Future<Output = JobResult> + Send + 'static,
{
    fn call(&self) -> BoxFuture<'static, ExecResult> {
        let inner = self.inner.clone();
        Box::pin(async move {
            match inner().await {
                Ok(()) => ExecResult::Ok,
                Err(err) => {
                    log::warn!(target: "scheduler::payload::UserJob", "job finished with error: {err}");
                    ExecResult::Other(1)
                }
            }
        })
    }
}
