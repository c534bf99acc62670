//! End-to-end tests for the multi-tier scheduler

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tiered_scheduler::prelude::*;

const LATCH_TIMEOUT: Duration = Duration::from_millis(500);

/// Count-down latch released when `count_down` has been called `count` times
struct Latch {
    remaining: Mutex<usize>,
    released: Condvar,
}

impl Latch {
    fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: Mutex::new(count),
            released: Condvar::new(),
        })
    }

    fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.released.notify_all();
        }
    }

    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            if self.released.wait_until(&mut remaining, deadline).timed_out() {
                break;
            }
        }
        *remaining == 0
    }
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn started(name: &str, non_blocking: usize, blocking: usize) -> Scheduler {
    let _ = env_logger::builder().is_test(true).try_init();
    let scheduler =
        Scheduler::with_threads(name, non_blocking, blocking).expect("Failed to create scheduler");
    scheduler.start().expect("Failed to start scheduler");
    scheduler
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_live_workers_match_configuration() {
    let scheduler = started("lifecycle", 3, 2);
    assert_eq!(scheduler.live_workers(), 5);

    scheduler.start().expect("second start is a no-op");
    assert_eq!(scheduler.live_workers(), 5);
    assert!(scheduler.is_running());

    scheduler.stop();
    assert!(!scheduler.is_running());
    assert!(wait_for(Duration::from_secs(5), || scheduler.live_workers() == 0));
}

#[test]
fn test_shutdown_joins_all_workers() {
    let scheduler = started("joined", 2, 2);
    scheduler.shutdown().expect("Failed to shutdown scheduler");
    assert_eq!(scheduler.live_workers(), 0);

    // A second shutdown and a stop on a stopped scheduler are harmless.
    scheduler.shutdown().expect("Failed to shutdown scheduler");
    scheduler.stop();
}

#[test]
fn test_stop_wakes_idle_workers_promptly() {
    let config = SchedulerConfig::new("sleepy")
        .with_non_blocking_threads(2)
        .with_blocking_threads(2)
        .with_poll_interval(Duration::from_secs(30));
    let scheduler = Scheduler::with_config(config).expect("Failed to create scheduler");
    scheduler.start().expect("Failed to start scheduler");
    thread::sleep(Duration::from_millis(50));

    let begin = Instant::now();
    scheduler.shutdown().expect("Failed to shutdown scheduler");
    assert!(begin.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_worker_thread_names() {
    let scheduler = started("naming", 1, 1);

    let spread = scheduler
        .execute(|ctx| Ok(ctx.worker_name().to_string()))
        .expect("Failed to submit job");
    let blocking = scheduler
        .schedule_blockable(ClosureJob::new(|_ctx: &JobContext| {
            Ok(thread::current().name().map(str::to_string))
        }))
        .expect("Failed to submit job");

    assert_eq!(
        spread.wait_timeout(Duration::from_secs(5)).expect("runs"),
        "naming-0-nonblocking"
    );
    assert_eq!(
        blocking
            .wait_timeout(Duration::from_secs(5))
            .expect("runs")
            .as_deref(),
        Some("naming-0-blockable")
    );

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_scheduled_job_runs() {
    let scheduler = started("scenario-1", 2, 1);
    let counter = Arc::new(AtomicUsize::new(0));
    let latch = Latch::new(1);

    let counter_clone = Arc::clone(&counter);
    let latch_clone = Arc::clone(&latch);
    scheduler
        .execute(move |_ctx| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            latch_clone.count_down();
            Ok(())
        })
        .expect("Failed to submit job");

    assert!(latch.wait(LATCH_TIMEOUT));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_local_rescheduling_runs_both_jobs() {
    let scheduler = started("scenario-2", 2, 1);
    let latch = Latch::new(2);
    let workers = Arc::new(Mutex::new(Vec::new()));

    let latch_outer = Arc::clone(&latch);
    let workers_outer = Arc::clone(&workers);
    scheduler
        .execute(move |ctx| {
            let latch_inner = Arc::clone(&latch_outer);
            let workers_inner = Arc::clone(&workers_outer);
            ctx.schedule_locally(ClosureJob::new(move |ctx: &JobContext| {
                workers_inner.lock().push(ctx.worker_name().to_string());
                latch_inner.count_down();
                Ok(())
            }))?;

            workers_outer.lock().push(ctx.worker_name().to_string());
            latch_outer.count_down();
            Ok(())
        })
        .expect("Failed to submit job");

    assert!(latch.wait(LATCH_TIMEOUT));

    // The local job ran on the worker that scheduled it.
    let workers = workers.lock();
    assert_eq!(workers.len(), 2);
    assert_eq!(workers[0], workers[1]);

    drop(workers);
    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_blockable_rescheduling_runs_on_blocking_tier() {
    let scheduler = started("scenario-3", 2, 1);
    let latch = Latch::new(2);

    let latch_outer = Arc::clone(&latch);
    let outer = scheduler
        .execute(move |ctx| {
            let latch_inner = Arc::clone(&latch_outer);
            let inner = ctx.schedule_blockable(ClosureJob::new(move |ctx: &JobContext| {
                latch_inner.count_down();
                Ok(ctx.worker_name().to_string())
            }))?;
            latch_outer.count_down();
            Ok(inner)
        })
        .expect("Failed to submit job");

    assert!(latch.wait(LATCH_TIMEOUT));
    let inner = outer.wait_timeout(LATCH_TIMEOUT).expect("outer job completes");
    assert_eq!(
        inner.wait_timeout(LATCH_TIMEOUT).expect("blockable job completes"),
        "scenario-3-0-blockable"
    );

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_empty_tier_never_runs_its_jobs() {
    let scheduler = started("scenario-4", 1, 0);

    let stranded = scheduler
        .schedule_blockable(ClosureJob::new(|_ctx: &JobContext| Ok(())))
        .expect("blockable submission is accepted");
    let served = scheduler
        .execute(|_ctx| Ok(7))
        .expect("Failed to submit job");

    assert_eq!(*served.wait_timeout(LATCH_TIMEOUT).expect("runs"), 7);
    assert!(matches!(
        stranded.wait_timeout(Duration::from_millis(100)),
        Err(SchedulerError::WaitTimeout { .. })
    ));

    // Stopping discards the stranded job and fails its handle.
    scheduler.shutdown().expect("Failed to shutdown scheduler");
    assert!(stranded.is_failed());
}

#[test]
fn test_stop_dispatches_nothing_after_current_job() {
    let scheduler = started("stop-mid-batch", 1, 0);
    let entered = Latch::new(1);
    let gate = Latch::new(1);
    let ran = Arc::new(AtomicUsize::new(0));

    let gated = {
        let (entered, gate, ran) = (Arc::clone(&entered), Arc::clone(&gate), Arc::clone(&ran));
        scheduler
            .execute(move |_ctx| {
                ran.fetch_add(1, Ordering::SeqCst);
                entered.count_down();
                gate.wait(Duration::from_secs(5));
                Ok(())
            })
            .expect("Failed to submit job")
    };
    assert!(entered.wait(LATCH_TIMEOUT), "worker never picked up the gated job");

    let queued: Vec<_> = (0..20)
        .map(|_| {
            let ran = Arc::clone(&ran);
            scheduler
                .execute(move |_ctx| {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .expect("Failed to submit job")
        })
        .collect();

    scheduler.stop();
    gate.count_down();

    gated.wait_timeout(LATCH_TIMEOUT).expect("gated job finishes");
    assert!(
        wait_for(LATCH_TIMEOUT, || queued.iter().all(|handle| handle.is_failed())),
        "jobs queued behind a stop must be discarded"
    );
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn test_empty_non_blocking_tier_still_serves_blockable_jobs() {
    let scheduler = started("io-only", 0, 2);
    assert_eq!(scheduler.live_workers(), 2);

    let handle = scheduler
        .schedule_blockable(ClosureJob::new(|_ctx: &JobContext| Ok("io")))
        .expect("Failed to submit job");
    assert_eq!(*handle.wait_timeout(LATCH_TIMEOUT).expect("runs"), "io");

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_submit_to_stopped_scheduler_fails_fast() {
    let scheduler = started("scenario-5", 2, 1);
    scheduler.stop();

    let err = scheduler
        .execute(|_ctx| Ok(()))
        .expect_err("stopped scheduler rejects jobs");
    assert!(matches!(err, SchedulerError::NotRunning { .. }));
    assert_eq!(err.to_string(), "Scheduler 'scenario-5' is not running");

    assert!(scheduler
        .schedule_blockable(ClosureJob::new(|_ctx: &JobContext| Ok(())))
        .is_err());
}

// ============================================================================
// Failures and load
// ============================================================================

#[test]
fn test_failures_propagate_to_handles() {
    let scheduler = started("failures", 2, 1);

    let failed = scheduler
        .schedule(ClosureJob::with_name(
            |_ctx: &JobContext| -> Result<()> { Err(SchedulerError::other("disk full")) },
            "Writer",
        ))
        .expect("Failed to submit job");
    let panicked = scheduler
        .schedule_blockable(ClosureJob::new(|_ctx: &JobContext| -> Result<()> {
            panic!("worker must survive this")
        }))
        .expect("Failed to submit job");

    match failed.wait_timeout(Duration::from_secs(5)) {
        Err(SchedulerError::JobFailed(failure)) => {
            assert_eq!(failure.job_type(), "Writer");
            assert!(!failure.is_panic());
            assert!(failure.message().contains("disk full"));
        }
        other => panic!("expected a job failure, got {:?}", other),
    }
    match panicked.wait_timeout(Duration::from_secs(5)) {
        Err(SchedulerError::JobFailed(failure)) => {
            assert!(failure.is_panic());
            assert!(failure.message().contains("worker must survive this"));
        }
        other => panic!("expected a panic failure, got {:?}", other),
    }

    // Both tiers keep working afterwards.
    let after = scheduler
        .schedule_blockable(ClosureJob::new(|_ctx: &JobContext| Ok(1)))
        .expect("Failed to submit job");
    assert_eq!(*after.wait_timeout(Duration::from_secs(5)).expect("runs"), 1);
    assert!(wait_for(Duration::from_secs(5), || {
        scheduler.total_jobs_failed() == 1 && scheduler.total_jobs_panicked() == 1
    }));

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_completion_listener_sees_result() {
    let scheduler = started("listener", 1, 1);
    let latch = Latch::new(1);
    let seen = Arc::new(Mutex::new(None));

    let handle = scheduler
        .execute(|_ctx| Ok(String::from("done")))
        .expect("Failed to submit job");
    let latch_clone = Arc::clone(&latch);
    let seen_clone = Arc::clone(&seen);
    handle.on_complete(move |result| {
        *seen_clone.lock() = result.ok().cloned();
        latch_clone.count_down();
    });

    assert!(latch.wait(Duration::from_secs(5)));
    assert_eq!(seen.lock().as_deref(), Some("done"));

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_concurrent_submitters_and_fan_out() {
    let scheduler = Arc::new(started("fan-out", 4, 2));
    let counter = Arc::new(AtomicUsize::new(0));
    let submitters = 8;
    let jobs_per_submitter = 250;

    let handles: Vec<_> = (0..submitters)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for i in 0..jobs_per_submitter {
                    let counter = Arc::clone(&counter);
                    scheduler
                        .execute(move |ctx| {
                            counter.fetch_add(1, Ordering::Relaxed);
                            // Every tenth job fans out one follow-up per mode.
                            if i % 10 == 0 {
                                for _ in 0..3 {
                                    let counter = Arc::clone(&counter);
                                    let job = ClosureJob::new(move |_ctx: &JobContext| {
                                        counter.fetch_add(1, Ordering::Relaxed);
                                        Ok(())
                                    });
                                    ctx.schedule(job)?;
                                }
                            }
                            Ok(())
                        })
                        .expect("Failed to submit job");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("submitter panicked");
    }

    let expected = submitters * jobs_per_submitter + submitters * (jobs_per_submitter / 10) * 3;
    assert!(wait_for(Duration::from_secs(10), || {
        counter.load(Ordering::Relaxed) == expected
    }));
    assert_eq!(scheduler.total_jobs_submitted(), expected as u64);

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_ring_private_queue() {
    let config = SchedulerConfig::new("ring-private")
        .with_non_blocking_threads(2)
        .with_blocking_threads(1)
        .with_private_queue(PrivateQueueKind::Ring { ring_size: 4 });
    let scheduler = Scheduler::with_config(config).expect("Failed to create scheduler");
    scheduler.start().expect("Failed to start scheduler");

    let latch = Latch::new(20);
    let latch_outer = Arc::clone(&latch);
    scheduler
        .execute(move |ctx| {
            for _ in 0..20 {
                let latch = Arc::clone(&latch_outer);
                ctx.schedule_locally(ClosureJob::new(move |_ctx: &JobContext| {
                    latch.count_down();
                    Ok(())
                }))?;
            }
            Ok(())
        })
        .expect("Failed to submit job");

    assert!(latch.wait(Duration::from_secs(5)));
    scheduler.shutdown().expect("Failed to shutdown scheduler");
}
