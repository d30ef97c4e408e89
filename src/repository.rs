//! Repository adapter (§6): persisting job definitions is explicitly out of
//! scope for the core. `load_all` is invoked once at manager boot before the
//! state machine transitions to `Running`/`Suspended` (§4.5); `drop_persisted`
//! is invoked by a worker when a one-shot (or now-exhausted) job has
//! finished and its durable row should be removed.

use crate::job::{JobKey, JobSpec};
use crate::error::RepositoryError;

/// Context handed to the repository adapter. Deliberately opaque here: the
/// connection/session plumbing this would carry is its own out-of-scope
/// subsystem (§1).
pub struct RepositoryContext;

pub trait RepositoryAdapter: Send + Sync {
    /// Loads every job definition that should be scheduled at boot.
    fn load_all(&self, context: &RepositoryContext) -> Result<Vec<JobSpec>, RepositoryError>;

    /// Removes a one-shot (or exhausted) job's persisted definition. Called
    /// from the worker epilogue, never from the manager thread.
    fn drop_persisted(
        &self,
        id: &JobKey,
        context: &RepositoryContext,
    ) -> Result<(), RepositoryError>;
}

/// The repository adapter used when nothing external is wired up: boots
/// with no jobs, and treats every drop as already persisted-clean. Useful
/// for the demo binary and for tests that build their schedule purely via
/// `Scheduler::add_job`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRepository;

impl RepositoryAdapter for NullRepository {
    fn load_all(&self, _context: &RepositoryContext) -> Result<Vec<JobSpec>, RepositoryError> {
        Ok(Vec::new())
    }

    fn drop_persisted(
        &self,
        _id: &JobKey,
        _context: &RepositoryContext,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }
}
