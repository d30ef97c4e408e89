//! Boundary scenarios from the scheduler's testable-properties list:
//! drop-while-running and suspend-across-fires. The single-fire scenarios
//! (due-in-future, two-at-once, spawn failure, disabled-at-top) live next
//! to the manager loop in `src/scheduler/mod.rs`; these two need a
//! recurring cadence and real wall-clock timing, so they're kept as
//! crate-level integration tests the way the pack's other multi-crate
//! repos place cross-module behavior under `tests/`.

use event_scheduler::job::{JobKey, JobSpec, JobStatus, Limit, Recurrence};
use event_scheduler::payload::{AsyncFn, ClosurePayload, ExecResult};
use event_scheduler::scheduler::Scheduler;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counting_payload(counter: Arc<AtomicUsize>, work: Duration) -> Arc<dyn event_scheduler::payload::PayloadAdapter> {
    struct Work {
        counter: Arc<AtomicUsize>,
        work: Duration,
    }
    impl AsyncFn for Work {
        fn call(&self) -> futures::future::BoxFuture<'static, ExecResult> {
            let counter = self.counter.clone();
            let work = self.work;
            Box::pin(async move {
                tokio::time::sleep(work).await;
                counter.fetch_add(1, Ordering::SeqCst);
                ExecResult::Ok
            })
        }
    }
    Arc::new(ClosurePayload::new(Work { counter, work }))
}

fn every_second_spec(name: &str, payload: Arc<dyn event_scheduler::payload::PayloadAdapter>) -> JobSpec {
    JobSpec {
        key: JobKey::new("db", name),
        definer_principal: "root".into(),
        schema: "db".into(),
        recurrence: Recurrence::Cron("* * * * * *".parse().unwrap(), Limit::None),
        status: JobStatus::Enabled,
        payload,
    }
}

#[test]
fn drop_while_running_removes_it_and_stops_further_fires() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let scheduler = Scheduler::new(runtime.handle().clone());

    let counter = Arc::new(AtomicUsize::new(0));
    let key = JobKey::new("db", "dropme");
    scheduler.add_job(every_second_spec("dropme", counting_payload(counter.clone(), Duration::from_millis(800))));
    scheduler.start().unwrap();

    // Let the first fire begin before dropping it mid-execution.
    std::thread::sleep(Duration::from_millis(300));
    scheduler.drop_job(&key).expect("job should be droppable while running");

    // The in-flight execution finishes, but no further fire happens.
    std::thread::sleep(Duration::from_millis(2500));

    assert_eq!(counter.load(Ordering::SeqCst), 1, "only the in-flight run should have completed");
    assert_eq!(scheduler.workers_count(), 0);

    scheduler.stop().unwrap();
}

#[test]
fn suspend_blocks_fires_until_resume() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let scheduler = Scheduler::new(runtime.handle().clone());

    let counter = Arc::new(AtomicUsize::new(0));
    scheduler.add_job(every_second_spec(
        "ticker",
        counting_payload(counter.clone(), Duration::from_millis(50)),
    ));
    scheduler.start().unwrap();

    std::thread::sleep(Duration::from_millis(500));
    scheduler.suspend().unwrap();
    let count_at_suspend = counter.load(Ordering::SeqCst);

    // No fires should land while suspended.
    std::thread::sleep(Duration::from_millis(2500));
    assert_eq!(counter.load(Ordering::SeqCst), count_at_suspend);

    scheduler.resume().unwrap();
    std::thread::sleep(Duration::from_millis(1500));
    assert!(
        counter.load(Ordering::SeqCst) > count_at_suspend,
        "job should resume firing after resume()"
    );

    scheduler.stop().unwrap();
}

#[test]
fn add_then_drop_before_ever_firing_is_a_no_op() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let scheduler = Scheduler::new(runtime.handle().clone());
    let key = JobKey::new("db", "never_fires");

    scheduler.add_job(JobSpec {
        key: key.clone(),
        definer_principal: "root".into(),
        schema: "db".into(),
        recurrence: Recurrence::Once(chrono::Utc::now() + chrono::Duration::hours(1)),
        status: JobStatus::Enabled,
        payload: counting_payload(Arc::new(AtomicUsize::new(0)), Duration::from_millis(0)),
    });

    scheduler.drop_job(&key).unwrap();
    assert!(scheduler.drop_job(&key).is_err());
}
