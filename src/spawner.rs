//! Worker spawning seam.
//!
//! The manager never calls `tokio::spawn` directly; it goes through a
//! `WorkerSpawner` so that boundary scenario 5 (§8: the executor refuses a
//! spawn, e.g. `CannotFork`) can be exercised deterministically in tests
//! without needing to actually exhaust a runtime's OS threads.

use std::future::Future;
use std::pin::Pin;
use tokio::task::JoinHandle;

/// A spawned worker's handle, abstracted over the concrete executor. The
/// manager keeps these in its worker census (§4.6) so `stop_all_running_workers`
/// can abort them during shutdown.
pub struct WorkerTaskHandle {
    join: JoinHandle<()>,
}

impl WorkerTaskHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn abort(&self) {
        self.join.abort();
    }
}

pub trait WorkerSpawner: Send + Sync {
    /// Attempts to start `task` running. Returns `None` if the executor
    /// refused the spawn (§7: `CannotFork`) — the manager must then treat
    /// the job as not-running and let the state machine decide whether to
    /// retry, per the same deadline, on the next wake.
    fn spawn(&self, task: Pin<Box<dyn Future<Output = ()> + Send>>) -> Option<WorkerTaskHandle>;
}

/// The production spawner: delegates to a live Tokio runtime handle,
/// exactly the way the teacher's `scheduler.rs` hands worker futures to
/// `tokio::spawn` from inside a blocking manager thread.
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl WorkerSpawner for TokioSpawner {
    fn spawn(&self, task: Pin<Box<dyn Future<Output = ()> + Send>>) -> Option<WorkerTaskHandle> {
        Some(WorkerTaskHandle {
            join: self.handle.spawn(task),
        })
    }
}

/// A spawner that always refuses, used to exercise the `CannotFork` path
/// (§8 boundary scenario 5) without depending on actually starving a real
/// executor of OS threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingSpawner;

impl WorkerSpawner for FailingSpawner {
    fn spawn(&self, _task: Pin<Box<dyn Future<Output = ()> + Send>>) -> Option<WorkerTaskHandle> {
        None
    }
}
