use event_scheduler::job::{JobKey, JobSpec, JobStatus, Limit, Recurrence};
use event_scheduler::payload::{AsyncFn, ClosurePayload, ExecResult};
use event_scheduler::scheduler::Scheduler;
use std::sync::Arc;
use std::{thread, time::Duration};

struct PrintGreeting(&'static str);

impl AsyncFn for PrintGreeting {
    fn call(&self) -> futures::future::BoxFuture<'static, ExecResult> {
        let msg = self.0;
        Box::pin(async move {
            println!("{msg}");
            ExecResult::Ok
        })
    }
}

fn main() {
    env_logger::init();

    let runtime = tokio::runtime::Runtime::new().expect("failed to build tokio runtime");
    let scheduler = Scheduler::new(runtime.handle().clone());

    scheduler.add_job(JobSpec {
        key: JobKey::new("main", "every_minute_hello"),
        definer_principal: "root".into(),
        schema: "main".into(),
        recurrence: Recurrence::Cron(
            "30 * * * * *".parse().unwrap(),
            Limit::NumTimes(5),
        ),
        status: JobStatus::Enabled,
        payload: Arc::new(ClosurePayload::new(PrintGreeting("Hello World from async job!"))),
    });

    scheduler.start().expect("scheduler failed to start");

    thread::sleep(Duration::from_secs(60));

    scheduler.add_job(JobSpec {
        key: JobKey::new("main", "route_data_collect"),
        definer_principal: "root".into(),
        schema: "main".into(),
        recurrence: Recurrence::Cron(
            "45 * * * * *".parse().unwrap(),
            Limit::NumTimes(2),
        ),
        status: JobStatus::Enabled,
        payload: Arc::new(ClosurePayload::new(PrintGreeting(
            "Pretend I'm collecting route data!",
        ))),
    });

    println!("suspending the scheduler for ten seconds...");
    scheduler.suspend().expect("suspend failed");
    thread::sleep(Duration::from_secs(10));
    println!("resuming...");
    scheduler.resume().expect("resume failed");

    for (name, value) in scheduler.dump_status() {
        println!("{name}: {value}");
    }

    thread::sleep(Duration::from_secs(120));
    scheduler.stop().expect("scheduler failed to stop cleanly");

    println!("Hello, world from main!");
}
