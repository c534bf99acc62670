//! Job trait and related types

use crate::core::completion::Completion;
use crate::core::error::{JobFailure, Result, SchedulerError};
use crate::scheduler::JobContext;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier assigned to a job when it is scheduled
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(id: u64) -> Self {
        JobId(id)
    }

    /// The numeric value of this id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// A unit of deferred work executed exactly once by a worker thread.
///
/// The context passed to [`invoke`](Job::invoke) lets the job schedule
/// further work on the scheduler that is running it.
pub trait Job: Send + 'static {
    /// Value delivered through the job's [`Completion`]
    type Output: Send + Sync + 'static;

    /// Perform the work
    ///
    /// # Errors
    ///
    /// Any error is recorded as a failure in the job's completion handle.
    fn invoke(&mut self, ctx: &JobContext) -> Result<Self::Output>;

    /// Get the job's type name for debugging and statistics
    fn job_type(&self) -> &str {
        "Job"
    }
}

/// Helper to create a job from a closure
pub struct ClosureJob<F, T>
where
    F: FnOnce(&JobContext) -> Result<T> + Send + 'static,
    T: Send + Sync + 'static,
{
    closure: Option<F>,
    name: String,
}

impl<F, T> ClosureJob<F, T>
where
    F: FnOnce(&JobContext) -> Result<T> + Send + 'static,
    T: Send + Sync + 'static,
{
    /// Create a new closure job
    pub fn new(closure: F) -> Self {
        Self {
            closure: Some(closure),
            name: "ClosureJob".to_string(),
        }
    }

    /// Create a new closure job with a custom name
    pub fn with_name<S: Into<String>>(closure: F, name: S) -> Self {
        Self {
            closure: Some(closure),
            name: name.into(),
        }
    }
}

impl<F, T> Job for ClosureJob<F, T>
where
    F: FnOnce(&JobContext) -> Result<T> + Send + 'static,
    T: Send + Sync + 'static,
{
    type Output = T;

    fn invoke(&mut self, ctx: &JobContext) -> Result<T> {
        match self.closure.take() {
            Some(closure) => closure(ctx),
            None => Err(SchedulerError::other(
                "ClosureJob already executed - cannot execute twice",
            )),
        }
    }

    fn job_type(&self) -> &str {
        &self.name
    }
}

/// How a single invocation ended, as seen by the worker
#[derive(Debug)]
pub(crate) enum RunOutcome {
    Succeeded,
    Failed(JobFailure),
    Panicked(JobFailure),
}

/// Type-erased job bound to its completion handle.
trait Invoke: Send {
    fn invoke(self: Box<Self>, id: JobId, ctx: &JobContext) -> RunOutcome;
    fn job_type(&self) -> &str;
}

struct BoundJob<J: Job> {
    job: J,
    completion: Completion<J::Output>,
}

impl<J: Job> Invoke for BoundJob<J> {
    fn invoke(mut self: Box<Self>, id: JobId, ctx: &JobContext) -> RunOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| self.job.invoke(ctx)));

        let outcome = match result {
            Ok(Ok(value)) => {
                self.completion.settle(Ok(value));
                return RunOutcome::Succeeded;
            }
            Ok(Err(e)) => RunOutcome::Failed(JobFailure::failed(
                id,
                self.job.job_type(),
                e.to_string(),
            )),
            Err(panic_info) => RunOutcome::Panicked(JobFailure::panicked(
                id,
                self.job.job_type(),
                panic_message(panic_info.as_ref()),
            )),
        };

        if let RunOutcome::Failed(failure) | RunOutcome::Panicked(failure) = &outcome {
            self.completion.settle(Err(failure.clone()));
        }
        outcome
    }

    fn job_type(&self) -> &str {
        self.job.job_type()
    }
}

impl<J: Job> Drop for BoundJob<J> {
    fn drop(&mut self) {
        if !self.completion.is_complete() {
            let failure = JobFailure::failed(
                self.completion.job_id(),
                self.job.job_type(),
                "discarded before execution",
            );
            self.completion.settle(Err(failure));
        }
    }
}

pub(crate) fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// A job accepted for scheduling: the element every queue stores.
///
/// Owns the job and the writing side of its completion handle. Invoking it
/// consumes it, so a scheduled job can run at most once; dropping it
/// un-invoked completes its handle with a failure.
pub struct ScheduledJob {
    id: JobId,
    inner: Box<dyn Invoke>,
}

impl ScheduledJob {
    /// Bind a job to a fresh completion handle.
    pub fn new<J: Job>(job: J) -> (Self, Completion<J::Output>) {
        let id = JobId::next();
        let completion = Completion::new(id);
        let scheduled = ScheduledJob {
            id,
            inner: Box::new(BoundJob {
                job,
                completion: completion.clone(),
            }),
        };
        (scheduled, completion)
    }

    /// The job's unique id
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The job's type name
    pub fn job_type(&self) -> &str {
        self.inner.job_type()
    }

    /// Identity hash used to pick a stripe
    pub fn stripe_hash(&self) -> usize {
        // Fibonacci hashing spreads sequential ids across the high bits.
        (self.id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize
    }

    /// Run the job and settle its completion handle.
    pub(crate) fn run(self, ctx: &JobContext) -> RunOutcome {
        self.inner.invoke(self.id, ctx)
    }
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScheduledJob({}, {})", self.id, self.job_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::JobContext;

    #[test]
    fn test_closure_job() {
        let ctx = JobContext::detached("test");
        let mut job = ClosureJob::new(|_ctx: &JobContext| Ok(42));

        assert_eq!(job.job_type(), "ClosureJob");
        assert_eq!(job.invoke(&ctx).ok(), Some(42));
        assert!(job.invoke(&ctx).is_err());
    }

    #[test]
    fn test_closure_job_with_name() {
        let job = ClosureJob::with_name(|_ctx: &JobContext| Ok(()), "TestJob");
        assert_eq!(job.job_type(), "TestJob");
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _) = ScheduledJob::new(ClosureJob::new(|_ctx: &JobContext| Ok(())));
        let (b, _) = ScheduledJob::new(ClosureJob::new(|_ctx: &JobContext| Ok(())));
        assert_ne!(a.id(), b.id());
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_run_completes_handle() {
        let ctx = JobContext::detached("test");
        let (job, completion) = ScheduledJob::new(ClosureJob::new(|_ctx: &JobContext| Ok("done")));

        assert!(matches!(job.run(&ctx), RunOutcome::Succeeded));
        assert_eq!(completion.result(), Some(&"done"));
    }

    #[test]
    fn test_run_records_error() {
        let ctx = JobContext::detached("test");
        let (job, completion) = ScheduledJob::new(ClosureJob::with_name(
            |_ctx: &JobContext| -> Result<()> { Err(SchedulerError::other("boom")) },
            "Exploder",
        ));

        assert!(matches!(job.run(&ctx), RunOutcome::Failed(_)));
        let failure = completion.error().expect("handle should hold the failure");
        assert_eq!(failure.message(), "boom");
        assert_eq!(failure.job_type(), "Exploder");
    }

    #[test]
    fn test_run_catches_panic() {
        let ctx = JobContext::detached("test");
        let (job, completion) = ScheduledJob::new(ClosureJob::new(|_ctx: &JobContext| -> Result<()> {
            panic!("Intentional panic for testing");
        }));

        assert!(matches!(job.run(&ctx), RunOutcome::Panicked(_)));
        let failure = completion.error().expect("handle should hold the failure");
        assert!(failure.is_panic());
        assert_eq!(failure.message(), "Intentional panic for testing");
    }

    #[test]
    fn test_dropped_job_fails_handle() {
        let (job, completion) = ScheduledJob::new(ClosureJob::new(|_ctx: &JobContext| Ok(1)));
        drop(job);

        let failure = completion.error().expect("discarded job should fail its handle");
        assert_eq!(failure.message(), "discarded before execution");
    }

    #[test]
    fn test_stripe_hash_spreads_sequential_ids() {
        let hashes: std::collections::HashSet<usize> = (0..64)
            .map(|_| ScheduledJob::new(ClosureJob::new(|_ctx: &JobContext| Ok(()))).0)
            .map(|job| job.stripe_hash() & 3)
            .collect();
        assert_eq!(hashes.len(), 4);
    }
}
