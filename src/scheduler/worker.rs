//! Worker thread implementation
//!
//! Non-blocking workers serve their private queue first, then one stripe of
//! the shared public queue, draining both in batches. Blocking workers pop
//! the shared blocking queue one job at a time. Both sleep on their queue's
//! monitor when idle and exit once their run's `running` flag is cleared.

use crate::core::error::{Result, SchedulerError};
use crate::core::job::{RunOutcome, ScheduledJob};
use crate::queue::{BlockingQueue, JobQueue, ListQueue, Monitor, PublicPrivateQueue, SharedQueue};
use crate::scheduler::config::PrivateQueueKind;
use crate::scheduler::context::{JobContext, Submitter};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::{span, Level};

/// Statistics for a worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total number of jobs that completed successfully
    pub jobs_processed: AtomicU64,
    /// Total number of jobs that returned an error
    pub jobs_failed: AtomicU64,
    /// Total number of jobs that panicked
    pub jobs_panicked: AtomicU64,
    /// Total time spent running jobs (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment jobs processed counter
    pub fn increment_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment jobs failed counter
    pub fn increment_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment jobs panicked counter
    pub fn increment_panicked(&self) {
        self.jobs_panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Add processing time
    pub fn add_processing_time(&self, microseconds: u64) {
        self.total_processing_time_us
            .fetch_add(microseconds, Ordering::Relaxed);
    }

    /// Get total jobs processed
    pub fn get_jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Get total jobs failed
    pub fn get_jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Get total jobs panicked
    pub fn get_jobs_panicked(&self) -> u64 {
        self.jobs_panicked.load(Ordering::Relaxed)
    }

    /// Get average processing time per successful job in microseconds
    pub fn get_average_processing_time_us(&self) -> f64 {
        let total = self.total_processing_time_us.load(Ordering::Relaxed);
        let count = self.jobs_processed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }
}

/// Decrements the live worker count when the thread exits, panic or not.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn enter(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        LiveGuard(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Handle to a spawned worker thread
#[derive(Debug)]
pub(crate) struct Worker {
    name: String,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a named thread running `body`.
    ///
    /// The thread counts towards `live` from before this returns until it
    /// exits.
    pub(crate) fn spawn<F>(name: String, live: Arc<AtomicUsize>, body: F) -> Result<Self>
    where
        F: FnOnce(&WorkerStats) + Send + 'static,
    {
        let stats = Arc::new(WorkerStats::new());
        let stats_clone = Arc::clone(&stats);
        let guard = LiveGuard::enter(live);

        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _guard = guard;
                log::debug!("worker started");
                body(&stats_clone);
                log::debug!(
                    "worker exiting after {} jobs ({} failed, {} panicked)",
                    stats_clone.get_jobs_processed(),
                    stats_clone.get_jobs_failed(),
                    stats_clone.get_jobs_panicked()
                );
            })
            .map_err(|e| {
                SchedulerError::spawn(name.clone(), "Failed to spawn worker", e)
            })?;

        Ok(Self {
            name,
            thread: Some(thread),
            stats,
        })
    }

    /// Get the worker thread's name
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Get worker statistics
    pub(crate) fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Join the worker thread.
    ///
    /// A worker joining itself (shutdown called from inside a job) is
    /// detached instead.
    pub(crate) fn join(mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return Ok(());
            }
            thread
                .join()
                .map_err(|_| SchedulerError::join(&self.name, "Worker panicked"))?;
        }
        Ok(())
    }
}

/// Everything a worker needs from its run, cloned per worker.
#[derive(Clone)]
pub(crate) struct RunShared {
    pub(crate) scheduler: Arc<str>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) submitted: Arc<AtomicU64>,
    /// The striped public queue
    pub(crate) public: SharedQueue,
    pub(crate) blocking: SharedQueue,
    pub(crate) poll_interval: Duration,
}

impl RunShared {
    fn shared_submitter(&self, queue: &SharedQueue) -> Submitter {
        Submitter::shared(
            Arc::clone(queue),
            Arc::clone(&self.running),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.submitted),
        )
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Worker serving a private queue and one stripe of the public queue
pub(crate) struct NonBlockingWorker {
    pub(crate) run: RunShared,
    pub(crate) stripe: SharedQueue,
    pub(crate) stripe_monitor: Arc<Monitor<ListQueue>>,
    pub(crate) private_queue: PrivateQueueKind,
}

impl NonBlockingWorker {
    pub(crate) fn run(self, name: &str, stats: &WorkerStats) {
        #[cfg(feature = "tracing")]
        let worker_span = span!(Level::DEBUG, "worker", name = name, tier = "nonblocking");
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        let private = self.private_queue.build();
        let ctx = JobContext::new(
            self.run.shared_submitter(&self.run.public),
            Submitter::local(
                Rc::clone(&private),
                Arc::clone(&self.run.running),
                Arc::clone(&self.run.scheduler),
                Arc::clone(&self.run.submitted),
            ),
            self.run.shared_submitter(&self.run.blocking),
            Arc::from(name),
        );

        let queue = BlockingQueue::new(
            PublicPrivateQueue::new(self.stripe, private),
            self.stripe_monitor,
            self.run.poll_interval,
        );

        while self.run.is_running() {
            let batch = queue.bulk_pop();

            #[cfg(feature = "tracing")]
            if batch.has_contents() {
                crate::tracing::metrics::record_batch(name);
            }

            while let Some(job) = batch.pop() {
                if !self.run.is_running() {
                    // The rest of the batch is dropped, failing its handles.
                    break;
                }
                execute_job(job, &ctx, stats);
            }
        }
    }
}

/// Worker serving the shared blocking queue
pub(crate) struct BlockingWorker {
    pub(crate) run: RunShared,
    pub(crate) monitor: Arc<Monitor<ListQueue>>,
}

impl BlockingWorker {
    pub(crate) fn run(self, name: &str, stats: &WorkerStats) {
        #[cfg(feature = "tracing")]
        let worker_span = span!(Level::DEBUG, "worker", name = name, tier = "blockable");
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        let ctx = JobContext::new(
            self.run.shared_submitter(&self.run.public),
            self.run.shared_submitter(&self.run.public),
            self.run.shared_submitter(&self.run.blocking),
            Arc::from(name),
        );

        let queue = BlockingQueue::new(
            Arc::clone(&self.run.blocking),
            self.monitor,
            self.run.poll_interval,
        );

        while self.run.is_running() {
            if let Some(job) = queue.pop() {
                if !self.run.is_running() {
                    break;
                }
                execute_job(job, &ctx, stats);
            }
        }
    }
}

/// Run a single job; panics are already contained by the job itself.
fn execute_job(job: ScheduledJob, ctx: &JobContext, stats: &WorkerStats) {
    #[cfg(feature = "tracing")]
    let job_span = span!(
        Level::DEBUG,
        "job_execution",
        job_id = job.id().as_u64(),
        job_type = job.job_type()
    );
    #[cfg(feature = "tracing")]
    let _job_guard = job_span.enter();

    let start = Instant::now();
    let outcome = job.run(ctx);
    let elapsed = start.elapsed();

    match outcome {
        RunOutcome::Succeeded => {
            stats.increment_processed();
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_completion(elapsed, true);
        }
        RunOutcome::Failed(failure) => {
            log::warn!("{}: {}", ctx.worker_name(), failure);
            stats.increment_failed();
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_completion(elapsed, false);
        }
        RunOutcome::Panicked(failure) => {
            log::error!("{}: {}", ctx.worker_name(), failure);
            stats.increment_panicked();
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_panic(elapsed);
        }
    }

    stats.add_processing_time(elapsed.as_micros() as u64);
}
