//! The scheduling capability handed to running jobs

use crate::core::completion::Completion;
use crate::core::error::{Result, SchedulerError};
use crate::core::job::{Job, ScheduledJob};
use crate::queue::{JobQueue, ListQueue, SharedQueue};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
enum Target {
    Shared(SharedQueue),
    /// A worker's private queue, reachable only from that worker's thread
    Local(Rc<dyn JobQueue>),
}

/// Pushes jobs onto one queue while the owning run is active.
#[derive(Clone)]
pub(crate) struct Submitter {
    target: Target,
    running: Arc<AtomicBool>,
    scheduler: Arc<str>,
    submitted: Arc<AtomicU64>,
}

impl Submitter {
    pub(crate) fn shared(
        queue: SharedQueue,
        running: Arc<AtomicBool>,
        scheduler: Arc<str>,
        submitted: Arc<AtomicU64>,
    ) -> Self {
        Self {
            target: Target::Shared(queue),
            running,
            scheduler,
            submitted,
        }
    }

    pub(crate) fn local(
        queue: Rc<dyn JobQueue>,
        running: Arc<AtomicBool>,
        scheduler: Arc<str>,
        submitted: Arc<AtomicU64>,
    ) -> Self {
        Self {
            target: Target::Local(queue),
            running,
            scheduler,
            submitted,
        }
    }

    pub(crate) fn submit<J: Job>(&self, job: J) -> Result<Completion<J::Output>> {
        if !self.running.load(Ordering::Acquire) {
            return Err(SchedulerError::not_running(&*self.scheduler));
        }

        let (scheduled, completion) = ScheduledJob::new(job);
        match &self.target {
            Target::Shared(queue) => queue.push(scheduled),
            Target::Local(queue) => queue.push(scheduled),
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_submission(match self.target {
            Target::Shared(_) => "shared",
            Target::Local(_) => "local",
        });

        Ok(completion)
    }
}

/// Passed to every running job so it can schedule further work.
///
/// Three submission modes trade parallelism against synchronization cost:
///
/// - [`schedule`](Self::schedule) spreads work across the non-blocking pool
///   through the shared striped queue
/// - [`schedule_locally`](Self::schedule_locally) keeps work on the current
///   worker's private queue, with no synchronization
/// - [`schedule_blockable`](Self::schedule_blockable) routes work that may
///   block (I/O, slow locks) to the separate blocking pool
///
/// A blocking worker has no private queue, so its local submissions spread
/// instead.
///
/// # Example
///
/// ```rust
/// use tiered_scheduler::prelude::*;
/// use std::time::Duration;
///
/// # fn main() -> Result<()> {
/// let scheduler = Scheduler::with_threads("fanout", 2, 1)?;
/// scheduler.start()?;
///
/// let outer = scheduler.execute(|ctx: &JobContext| {
///     let inner = ctx.schedule_locally(ClosureJob::new(|_ctx: &JobContext| Ok(2)))?;
///     Ok(inner)
/// })?;
///
/// let inner = outer.wait_timeout(Duration::from_secs(1))?;
/// assert_eq!(*inner.wait_timeout(Duration::from_secs(1))?, 2);
/// # scheduler.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct JobContext {
    spread: Submitter,
    local: Submitter,
    blockable: Submitter,
    worker_name: Arc<str>,
}

impl JobContext {
    pub(crate) fn new(
        spread: Submitter,
        local: Submitter,
        blockable: Submitter,
        worker_name: Arc<str>,
    ) -> Self {
        Self {
            spread,
            local,
            blockable,
            worker_name,
        }
    }

    /// A context attached to no running scheduler.
    ///
    /// Every submission fails with [`SchedulerError::NotRunning`]. Useful
    /// for invoking a [`Job`] directly, for example in its own unit tests.
    pub fn detached(name: &str) -> Self {
        let name: Arc<str> = Arc::from(name);
        let running = Arc::new(AtomicBool::new(false));
        let submitted = Arc::new(AtomicU64::new(0));
        let submitter = Submitter::local(
            Rc::new(ListQueue::new()),
            running,
            Arc::clone(&name),
            submitted,
        );
        Self {
            spread: submitter.clone(),
            local: submitter.clone(),
            blockable: submitter,
            worker_name: name,
        }
    }

    /// Schedule `job` on the shared striped queue.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] once the scheduler has stopped.
    pub fn schedule<J: Job>(&self, job: J) -> Result<Completion<J::Output>> {
        self.spread.submit(job)
    }

    /// Schedule `job` on the current worker's private queue.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] once the scheduler has stopped.
    pub fn schedule_locally<J: Job>(&self, job: J) -> Result<Completion<J::Output>> {
        self.local.submit(job)
    }

    /// Schedule `job` on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] once the scheduler has stopped.
    pub fn schedule_blockable<J: Job>(&self, job: J) -> Result<Completion<J::Output>> {
        self.blockable.submit(job)
    }

    /// Name of the worker thread running the current job
    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("worker_name", &self.worker_name)
            .finish()
    }
}
