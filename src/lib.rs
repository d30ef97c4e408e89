//! A time-ordered event scheduler core, embedded inside a database server.
//!
//! Owns an ordered queue of user-defined scheduled jobs, wakes at the
//! earliest next-fire instant, and dispatches each fired job to a
//! short-lived worker while preserving at-most-one concurrent execution
//! per job. Persisting job definitions, parsing recurrence syntax,
//! compiling/executing a job's payload, authorization, and connection
//! plumbing are all out of scope here and consumed through the adapter
//! traits in [`repository`], [`payload`], and [`identity`].
//!
//! ```no_run
//! use event_scheduler::job::{JobKey, JobSpec, JobStatus, Recurrence};
//! use event_scheduler::payload::{AsyncFn, ClosurePayload, ExecResult};
//! use event_scheduler::scheduler::Scheduler;
//! use std::sync::Arc;
//!
//! # struct PrintHello;
//! # impl AsyncFn for PrintHello {
//! #     fn call(&self) -> futures::future::BoxFuture<'static, ExecResult> {
//! #         Box::pin(async {
//! #             println!("hello from a scheduled job");
//! #             ExecResult::Ok
//! #         })
//! #     }
//! # }
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let scheduler = Scheduler::new(runtime.handle().clone());
//!
//! scheduler.add_job(JobSpec {
//!     key: JobKey::new("main", "say_hello"),
//!     definer_principal: "root".into(),
//!     schema: "main".into(),
//!     recurrence: Recurrence::Cron("0 * * * * *".parse().unwrap(), event_scheduler::job::Limit::NumTimes(1)),
//!     status: JobStatus::Enabled,
//!     payload: Arc::new(ClosurePayload::new(PrintHello)),
//! });
//!
//! scheduler.start().unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(61));
//! scheduler.stop().unwrap();
//! ```

pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handoff;
pub mod identity;
pub mod job;
pub mod payload;
pub mod queue;
pub mod repository;
pub mod scheduler;
pub mod spawner;

pub use crate::config::SchedulerConfig;
pub use crate::error::ControlError;
pub use crate::scheduler::{Scheduler, SchedulerState};
