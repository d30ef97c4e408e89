//! Scheduler State (§3/§4.5): the lifecycle enum and the three named
//! condition variables every transition signals.

use std::fmt;

/// `{Uninitialized, Initialized, Commencing, CantStart, Running, Suspended,
/// InShutdown}` per §3. Carries a full descriptive name in debug builds
/// (mirroring the original's `states_names` table, kept under
/// `cfg(debug_assertions)` per §10.5) and falls back to the derived
/// variant name in release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Uninitialized,
    Initialized,
    Commencing,
    CantStart,
    Running,
    Suspended,
    InShutdown,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(debug_assertions)]
        {
            let name = match self {
                SchedulerState::Uninitialized => "not yet initialized",
                SchedulerState::Initialized => "initialized, not started",
                SchedulerState::Commencing => "commencing start",
                SchedulerState::CantStart => "failed to start",
                SchedulerState::Running => "running",
                SchedulerState::Suspended => "suspended",
                SchedulerState::InShutdown => "shutting down",
            };
            write!(f, "{name}")
        }
        #[cfg(not(debug_assertions))]
        {
            write!(f, "{self:?}")
        }
    }
}

/// The three condition variables named in §4.5, kept distinct rather than
/// collapsed into one predicate-checked condvar, matching the original's
/// `cond_vars_names` diagnostic table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondvarName {
    /// Queue top changed, a job was added, or shutdown was requested.
    NewWork,
    /// The manager has reached a terminal start/stop state.
    StartedOrStopped,
    /// Acknowledgement channel for suspend/resume handshakes.
    SuspendOrResume,
}

impl fmt::Display for CondvarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CondvarName::NewWork => "new work",
            CondvarName::StartedOrStopped => "started or stopped",
            CondvarName::SuspendOrResume => "suspend or resume",
        };
        write!(f, "{name}")
    }
}
