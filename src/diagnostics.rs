//! Debug-only lock bookkeeping feeding `dump_status` (§6, §9, §10.5).
//!
//! Compiled out entirely in release builds so the steady-state manager
//! loop pays nothing for it; `dump_status` still emits the same row names,
//! just with empty values, matching §6's "exact row set ... is part of the
//! external contract."

use crate::scheduler::state::CondvarName;

#[cfg(debug_assertions)]
mod imp {
    use super::CondvarName;
    use std::time::Instant;

    #[derive(Default)]
    pub struct LockDiagnostics {
        last_locked_at: Option<Instant>,
        last_unlocked_at: Option<Instant>,
        waiting_on: Option<CondvarName>,
    }

    impl LockDiagnostics {
        pub fn mark_locked(&mut self) {
            self.last_locked_at = Some(Instant::now());
        }

        pub fn mark_unlocked(&mut self) {
            self.last_unlocked_at = Some(Instant::now());
        }

        pub fn set_waiting(&mut self, on: Option<CondvarName>) {
            self.waiting_on = on;
        }

        pub fn rows(&self) -> Vec<(String, String)> {
            vec![
                (
                    "last locked at".into(),
                    self.last_locked_at
                        .map(|t| format!("{:?} ago", t.elapsed()))
                        .unwrap_or_else(|| "never".into()),
                ),
                (
                    "last unlocked at".into(),
                    self.last_unlocked_at
                        .map(|t| format!("{:?} ago", t.elapsed()))
                        .unwrap_or_else(|| "never".into()),
                ),
                (
                    "waiting on condition".into(),
                    self.waiting_on
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "none".into()),
                ),
            ]
        }
    }
}

#[cfg(not(debug_assertions))]
mod imp {
    use super::CondvarName;

    #[derive(Default)]
    pub struct LockDiagnostics;

    impl LockDiagnostics {
        pub fn mark_locked(&mut self) {}
        pub fn mark_unlocked(&mut self) {}
        pub fn set_waiting(&mut self, _on: Option<CondvarName>) {}

        pub fn rows(&self) -> Vec<(String, String)> {
            vec![
                ("last locked at".into(), "unavailable (release build)".into()),
                ("last unlocked at".into(), "unavailable (release build)".into()),
                ("waiting on condition".into(), "unavailable (release build)".into()),
            ]
        }
    }
}

pub use imp::LockDiagnostics;
