//! Multi-tier scheduler

use crate::core::completion::Completion;
use crate::core::error::{Result, SchedulerError};
use crate::core::job::{ClosureJob, Job, ScheduledJob};
use crate::queue::{JobQueue, ListQueue, Monitor, QueueFactory, SharedQueue, StripedQueue};
use crate::scheduler::config::SchedulerConfig;
use crate::scheduler::context::JobContext;
use crate::scheduler::worker::{BlockingWorker, NonBlockingWorker, RunShared, Worker, WorkerStats};
use crate::tracing::TracedJob;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Which shared queue a submission from outside the workers lands on
#[derive(Clone, Copy)]
enum Tier {
    Spread,
    Blockable,
}

/// Queues, monitors and threads of one start/stop cycle.
///
/// Each run has its own `running` flag, so workers of a stopped run never
/// observe a later restart.
struct RunningState {
    running: Arc<AtomicBool>,
    public: SharedQueue,
    blocking: SharedQueue,
    monitors: Vec<Arc<Monitor<ListQueue>>>,
    workers: Vec<Worker>,
}

impl RunningState {
    /// Clear the run's flag and wake every sleeping worker.
    fn halt(&self) {
        self.running.store(false, Ordering::Release);
        for monitor in &self.monitors {
            monitor.close();
        }
    }
}

impl Drop for RunningState {
    fn drop(&mut self) {
        self.halt();
    }
}

enum SchedulerState {
    Stopped,
    Running(RunningState),
}

/// A scheduler with two worker tiers.
///
/// Non-blocking workers each own a private queue and one stripe of a shared
/// striped public queue. Blocking workers share a single synchronized queue,
/// so jobs that wait on I/O or slow locks never hold up the non-blocking
/// tier.
///
/// # Example
///
/// ```rust
/// use tiered_scheduler::prelude::*;
/// use std::time::Duration;
///
/// # fn main() -> Result<()> {
/// let scheduler = Scheduler::with_threads("example", 4, 2)?;
/// scheduler.start()?;
///
/// let sum = scheduler.execute(|_ctx: &JobContext| Ok((1..=10).sum::<u32>()))?;
/// assert_eq!(*sum.wait_timeout(Duration::from_secs(1))?, 55);
///
/// let io = scheduler.schedule_blockable(ClosureJob::new(|ctx: &JobContext| {
///     Ok(ctx.worker_name().ends_with("blockable"))
/// }))?;
/// assert!(*io.wait_timeout(Duration::from_secs(1))?);
///
/// scheduler.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    name: Arc<str>,
    state: RwLock<SchedulerState>,
    stats: RwLock<Vec<Arc<WorkerStats>>>,
    live_workers: Arc<AtomicUsize>,
    total_jobs_submitted: Arc<AtomicU64>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("live_workers", &self.live_workers())
            .field("total_jobs_submitted", &self.total_jobs_submitted())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler with core-count defaults
    pub fn new<S: Into<String>>(name: S) -> Result<Self> {
        Self::with_config(SchedulerConfig::new(name))
    }

    /// Create a scheduler with explicit tier sizes
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] for a blank name or when
    /// both tiers are empty.
    pub fn with_threads<S: Into<String>>(
        name: S,
        non_blocking_threads: usize,
        blocking_threads: usize,
    ) -> Result<Self> {
        Self::with_config(
            SchedulerConfig::new(name)
                .with_non_blocking_threads(non_blocking_threads)
                .with_blocking_threads(blocking_threads),
        )
    }

    /// Create a scheduler from a full configuration
    pub fn with_config(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            name: Arc::from(config.name.as_str()),
            config,
            state: RwLock::new(SchedulerState::Stopped),
            stats: RwLock::new(Vec::new()),
            live_workers: Arc::new(AtomicUsize::new(0)),
            total_jobs_submitted: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Start both worker tiers.
    ///
    /// Does nothing if the scheduler is already running. Each start builds
    /// fresh queues; jobs left over from a previous run are not carried over.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::SpawnError`] if a worker thread cannot be
    /// created. Threads spawned before the failure are stopped.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.write();
        if matches!(*state, SchedulerState::Running(_)) {
            return Ok(());
        }

        let run = self.launch()?;
        *self.stats.write() = run.workers.iter().map(Worker::stats).collect();
        *state = SchedulerState::Running(run);

        log::info!(
            "scheduler '{}' started with {} non-blocking and {} blocking workers",
            self.name,
            self.config.non_blocking_threads,
            self.config.blocking_threads
        );
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_scheduler_start(
            &self.name,
            self.config.non_blocking_threads,
            self.config.blocking_threads,
        );

        Ok(())
    }

    fn launch(&self) -> Result<RunningState> {
        let running = Arc::new(AtomicBool::new(true));

        // A pool without non-blocking workers still gets one (unserved)
        // stripe so spread submissions have somewhere to go.
        let stripe_count = self.config.non_blocking_threads.max(1);
        let stripes: Vec<_> = (0..stripe_count).map(|_| QueueFactory::monitored()).collect();
        let public: SharedQueue = Arc::new(StripedQueue::new(
            stripes
                .iter()
                .map(|(_, queue)| Arc::clone(queue) as SharedQueue)
                .collect(),
        )?);
        let (blocking_monitor, blocking) = QueueFactory::monitored();
        let blocking: SharedQueue = blocking;

        let mut monitors: Vec<_> = stripes.iter().map(|(monitor, _)| Arc::clone(monitor)).collect();
        monitors.push(Arc::clone(&blocking_monitor));

        let shared = RunShared {
            scheduler: Arc::clone(&self.name),
            running: Arc::clone(&running),
            submitted: Arc::clone(&self.total_jobs_submitted),
            public: Arc::clone(&public),
            blocking: Arc::clone(&blocking),
            poll_interval: self.config.poll_interval,
        };

        // Dropping a partially built run halts the threads it already has.
        let mut run = RunningState {
            running,
            public,
            blocking,
            monitors,
            workers: Vec::with_capacity(
                self.config.non_blocking_threads + self.config.blocking_threads,
            ),
        };

        for (id, (monitor, stripe)) in stripes
            .into_iter()
            .take(self.config.non_blocking_threads)
            .enumerate()
        {
            let name = format!("{}-{}-nonblocking", self.name, id);
            let body = NonBlockingWorker {
                run: shared.clone(),
                stripe,
                stripe_monitor: monitor,
                private_queue: self.config.private_queue,
            };
            let thread_name = name.clone();
            run.workers.push(Worker::spawn(
                name,
                Arc::clone(&self.live_workers),
                move |stats| body.run(&thread_name, stats),
            )?);
        }

        for id in 0..self.config.blocking_threads {
            let name = format!("{}-{}-blockable", self.name, id);
            let body = BlockingWorker {
                run: shared.clone(),
                monitor: Arc::clone(&blocking_monitor),
            };
            let thread_name = name.clone();
            run.workers.push(Worker::spawn(
                name,
                Arc::clone(&self.live_workers),
                move |stats| body.run(&thread_name, stats),
            )?);
        }

        Ok(run)
    }

    /// Stop the scheduler without waiting for its threads.
    ///
    /// Submissions fail from here on. Sleeping workers are woken and exit
    /// after their current job; jobs still queued are discarded and their
    /// handles fail. Does nothing if the scheduler is not running.
    pub fn stop(&self) {
        drop(self.take_run());
    }

    /// Stop the scheduler and wait for every worker thread to exit.
    ///
    /// Called from inside a job, the calling worker is not waited for.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::JoinError`] if a worker thread panicked
    /// outside of a job.
    pub fn shutdown(&self) -> Result<()> {
        let Some(mut run) = self.take_run() else {
            return Ok(());
        };

        let workers = std::mem::take(&mut run.workers);
        drop(run);

        for worker in workers {
            log::debug!("joining {}", worker.name());
            worker.join()?;
        }
        Ok(())
    }

    fn take_run(&self) -> Option<RunningState> {
        let previous = std::mem::replace(&mut *self.state.write(), SchedulerState::Stopped);
        let SchedulerState::Running(run) = previous else {
            return None;
        };
        run.halt();

        log::info!(
            "scheduler '{}' stopped after {} jobs ({} failed, {} panicked)",
            self.name,
            self.total_jobs_processed(),
            self.total_jobs_failed(),
            self.total_jobs_panicked()
        );
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_scheduler_stop(
            &self.name,
            self.total_jobs_processed(),
            self.total_jobs_failed(),
        );

        Some(run)
    }

    fn submit<J: Job>(&self, job: J, tier: Tier) -> Result<Completion<J::Output>> {
        let state = self.state.read();
        let run = match &*state {
            SchedulerState::Running(run) if run.running.load(Ordering::Acquire) => run,
            _ => return Err(SchedulerError::not_running(&*self.name)),
        };

        let (scheduled, completion) = ScheduledJob::new(job);
        match tier {
            Tier::Spread => run.public.push(scheduled),
            Tier::Blockable => run.blocking.push(scheduled),
        }
        self.total_jobs_submitted.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_submission(match tier {
            Tier::Spread => "shared",
            Tier::Blockable => "blockable",
        });

        Ok(completion)
    }

    /// Schedule `job` on the non-blocking tier through the striped public
    /// queue.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] if the scheduler is not running.
    pub fn schedule<J: Job>(&self, job: J) -> Result<Completion<J::Output>> {
        self.submit(job, Tier::Spread)
    }

    /// Schedule `job` on the blocking tier.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] if the scheduler is not running.
    pub fn schedule_blockable<J: Job>(&self, job: J) -> Result<Completion<J::Output>> {
        self.submit(job, Tier::Blockable)
    }

    /// Schedule a closure on the non-blocking tier
    pub fn execute<F, T>(&self, f: F) -> Result<Completion<T>>
    where
        F: FnOnce(&JobContext) -> Result<T> + Send + 'static,
        T: Send + Sync + 'static,
    {
        self.schedule(ClosureJob::new(f))
    }

    /// Schedule `job` wrapped in the caller's current tracing span
    pub fn schedule_traced<J: Job>(&self, job: J) -> Result<Completion<J::Output>> {
        self.schedule(TracedJob::new(job))
    }

    /// Check if the scheduler is running
    pub fn is_running(&self) -> bool {
        matches!(*self.state.read(), SchedulerState::Running(_))
    }

    /// Number of worker threads currently alive, across every run.
    ///
    /// After [`stop`](Self::stop) this drops to zero as workers finish
    /// their current job.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// Get the scheduler name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Get total number of jobs accepted, including jobs scheduled by jobs
    pub fn total_jobs_submitted(&self) -> u64 {
        self.total_jobs_submitted.load(Ordering::Relaxed)
    }

    /// Per-worker statistics of the current (or most recent) run,
    /// non-blocking workers first
    pub fn get_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.stats.read().clone()
    }

    /// Get total jobs processed successfully in the current (or most recent) run
    pub fn total_jobs_processed(&self) -> u64 {
        self.stats.read().iter().map(|s| s.get_jobs_processed()).sum()
    }

    /// Get total jobs that returned an error in the current (or most recent) run
    pub fn total_jobs_failed(&self) -> u64 {
        self.stats.read().iter().map(|s| s.get_jobs_failed()).sum()
    }

    /// Get total jobs that panicked in the current (or most recent) run
    pub fn total_jobs_panicked(&self) -> u64 {
        self.stats.read().iter().map(|s| s.get_jobs_panicked()).sum()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
