use futures::FutureExt;
use news_pipeline::scheduler::{JobFn, Scheduler};
use news_pipeline::types::PipelineError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn counting_job(counter: Arc<AtomicUsize>) -> JobFn {
    Arc::new(move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    })
}

fn failing_job(counter: Arc<AtomicUsize>) -> JobFn {
    Arc::new(move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Scheduler("boom".to_string()))
        }
        .boxed()
    })
}

#[tokio::test]
async fn run_immediately_dispatches_on_first_tick_only() {
    init_tracing();
    let scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));
    let counter = Arc::new(AtomicUsize::new(0));

    scheduler
        .add_task("immediate", counting_job(counter.clone()), Duration::from_secs(5), true)
        .await
        .unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    scheduler.stop().await;

    // Dispatched once right away; the 5 s interval gates any repeat.
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn job_without_run_immediately_waits_out_its_interval() {
    init_tracing();
    let scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));
    let counter = Arc::new(AtomicUsize::new(0));

    scheduler
        .add_task("patient", counting_job(counter.clone()), Duration::from_secs(10), false)
        .await
        .unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    scheduler.stop().await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn job_repeats_once_its_interval_elapses() {
    init_tracing();
    let scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));
    let counter = Arc::new(AtomicUsize::new(0));

    scheduler
        .add_task("repeating", counting_job(counter.clone()), Duration::from_millis(100), true)
        .await
        .unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    scheduler.stop().await;

    let runs = counter.load(Ordering::SeqCst);
    assert!(runs >= 3, "expected at least 3 runs, got {runs}");
}

#[tokio::test]
async fn slow_job_never_overlaps_itself() {
    init_tracing();
    let scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(10));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));

    let job: JobFn = {
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        Arc::new(move || {
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    };

    scheduler
        .add_task("slow", job, Duration::from_millis(10), true)
        .await
        .unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(700)).await;
    scheduler.stop().await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_job_does_not_stop_the_scheduler_or_other_jobs() {
    init_tracing();
    let scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));
    let failures = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));

    scheduler
        .add_task("broken", failing_job(failures.clone()), Duration::from_millis(100), true)
        .await
        .unwrap();
    scheduler
        .add_task("steady", counting_job(successes.clone()), Duration::from_millis(100), true)
        .await
        .unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(scheduler.is_running());
    scheduler.stop().await;

    // The failing job keeps retrying on its interval, and the healthy
    // job keeps running beside it.
    assert!(failures.load(Ordering::SeqCst) >= 2);
    assert!(successes.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn duplicate_name_replaces_the_prior_registration() {
    init_tracing();
    let scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));
    let old_counter = Arc::new(AtomicUsize::new(0));
    let new_counter = Arc::new(AtomicUsize::new(0));

    scheduler
        .add_task("job", counting_job(old_counter.clone()), Duration::from_secs(10), false)
        .await
        .unwrap();
    scheduler
        .add_task("job", counting_job(new_counter.clone()), Duration::from_secs(10), true)
        .await
        .unwrap();
    assert_eq!(scheduler.task_names().await.len(), 1);

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.stop().await;

    assert_eq!(old_counter.load(Ordering::SeqCst), 0);
    assert_eq!(new_counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replacement_waits_for_an_in_flight_dispatch() {
    init_tracing();
    let scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(10));
    let old_in_flight = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let new_runs = Arc::new(AtomicUsize::new(0));

    let old_job: JobFn = {
        let old_in_flight = Arc::clone(&old_in_flight);
        Arc::new(move || {
            let old_in_flight = Arc::clone(&old_in_flight);
            async move {
                old_in_flight.store(true, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                old_in_flight.store(false, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    };
    scheduler
        .add_task("job", old_job, Duration::from_millis(10), true)
        .await
        .unwrap();
    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Replace the job while its first dispatch is still sleeping.
    let new_job: JobFn = {
        let old_in_flight = Arc::clone(&old_in_flight);
        let overlapped = Arc::clone(&overlapped);
        let new_runs = Arc::clone(&new_runs);
        Arc::new(move || {
            let old_in_flight = Arc::clone(&old_in_flight);
            let overlapped = Arc::clone(&overlapped);
            let new_runs = Arc::clone(&new_runs);
            async move {
                if old_in_flight.load(Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                new_runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    };
    scheduler
        .add_task("job", new_job, Duration::from_millis(10), true)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    scheduler.stop().await;

    assert!(!overlapped.load(Ordering::SeqCst));
    assert!(new_runs.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn zero_interval_registration_is_rejected() {
    init_tracing();
    let scheduler = Scheduler::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let result = scheduler
        .add_task("bad", counting_job(counter), Duration::ZERO, false)
        .await;
    assert!(matches!(result, Err(PipelineError::Config(_))));
}

#[tokio::test]
async fn remove_task_deregisters_and_tolerates_absence() {
    init_tracing();
    let scheduler = Scheduler::new();
    let counter = Arc::new(AtomicUsize::new(0));

    scheduler
        .add_task("job", counting_job(counter), Duration::from_secs(1), false)
        .await
        .unwrap();
    assert!(scheduler.remove_task("job").await);
    assert!(!scheduler.remove_task("job").await);
    assert!(scheduler.task_names().await.is_empty());
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    init_tracing();
    let scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));

    scheduler.start().await;
    scheduler.start().await; // warns, no-op
    assert!(scheduler.is_running());

    scheduler.stop().await;
    scheduler.stop().await; // warns, no-op
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn stop_prevents_further_dispatches() {
    init_tracing();
    let scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));
    let counter = Arc::new(AtomicUsize::new(0));

    scheduler
        .add_task("job", counting_job(counter.clone()), Duration::from_millis(50), true)
        .await
        .unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.stop().await;

    let at_stop = counter.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(counter.load(Ordering::SeqCst), at_stop);
}
