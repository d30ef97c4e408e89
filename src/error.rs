//! Hand-rolled error types for the scheduler's external interfaces.
//!
//! The crate follows the teacher's own convention (see the old
//! `career::error::DescheduleError`): a plain enum with a manual
//! `Display` and `std::error::Error` impl, no derive-macro crate.

use core::fmt;

/// Returned by the control surface (`start`, `stop`, `suspend`, `resume`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// `stop` was called while the scheduler was not `Running` or `Suspended`.
    NotRunning,
    /// The manager thread could not be spawned, or it reported a boot failure.
    CannotStart,
    /// A cooperative cancellation of the manager thread could not be delivered.
    CannotKill,
    /// The operation conflicts with an already in-flight identical operation.
    AlreadyRunning,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::NotRunning => write!(f, "scheduler is not running"),
            ControlError::CannotStart => write!(f, "scheduler manager failed to start"),
            ControlError::CannotKill => write!(f, "could not signal the manager thread to stop"),
            ControlError::AlreadyRunning => write!(f, "operation already in progress"),
        }
    }
}

impl std::error::Error for ControlError {}

/// Returned by [`crate::job::DescheduleError`]-adjacent bookkeeping when a
/// caller tries to drop a job id that the scheduler doesn't know about, or
/// that is already scheduled for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescheduleError {
    AlreadyScheduled,
    JobDoesNotExist,
}

impl fmt::Display for DescheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescheduleError::AlreadyScheduled => {
                write!(f, "job was already scheduled for deletion")
            }
            DescheduleError::JobDoesNotExist => write!(f, "no job with that id exists"),
        }
    }
}

impl std::error::Error for DescheduleError {}

/// Returned by a [`crate::repository::RepositoryAdapter`].
#[derive(Debug)]
pub enum RepositoryError {
    LoadFailed(String),
    DropFailed(String),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::LoadFailed(msg) => write!(f, "failed to load jobs: {msg}"),
            RepositoryError::DropFailed(msg) => {
                write!(f, "failed to drop persisted job: {msg}")
            }
        }
    }
}

impl std::error::Error for RepositoryError {}
