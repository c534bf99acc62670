//! Tracing integration for observability.
//!
//! With the `tracing` feature enabled, workers run inside per-worker spans
//! and emit the [`metrics`] events below. [`TracedJob`] carries the
//! submitter's span across to the worker thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use tiered_scheduler::prelude::*;
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env()
//!         .add_directive("tiered_scheduler=debug".parse().unwrap()))
//!     .init();
//!
//! let scheduler = Scheduler::with_threads("traced", 4, 1)?;
//! scheduler.start()?;
//!
//! let _span = tracing::info_span!("request", id = 7).entered();
//! scheduler.schedule_traced(MyJob::new())?;
//! ```

use crate::core::error::Result;
use crate::core::job::Job;
use crate::scheduler::JobContext;

/// A job wrapper that propagates tracing context across thread boundaries.
///
/// The current span is captured when the wrapper is created and entered
/// while the job runs on a worker.
pub struct TracedJob<J: Job> {
    inner: J,
    #[cfg(feature = "tracing")]
    span: tracing::Span,
}

impl<J: Job> TracedJob<J> {
    /// Wrap `job`, capturing the current span.
    pub fn new(job: J) -> Self {
        Self {
            inner: job,
            #[cfg(feature = "tracing")]
            span: tracing::Span::current(),
        }
    }

    /// Wrap `job` with a specific span.
    #[cfg(feature = "tracing")]
    pub fn with_span(job: J, span: tracing::Span) -> Self {
        Self { inner: job, span }
    }
}

impl<J: Job> Job for TracedJob<J> {
    type Output = J::Output;

    fn invoke(&mut self, ctx: &JobContext) -> Result<J::Output> {
        #[cfg(feature = "tracing")]
        let _guard = self.span.enter();
        self.inner.invoke(ctx)
    }

    fn job_type(&self) -> &str {
        self.inner.job_type()
    }
}

/// Metrics recording functions for observability.
///
/// These emit `trace!` events that a subscriber can turn into counters,
/// gauges and histograms.
#[cfg(feature = "tracing")]
pub mod metrics {
    use std::time::Duration;

    /// Records a job submission.
    #[inline]
    pub fn record_submission(target: &str) {
        tracing::trace!(counter.jobs_submitted = 1, target = target, "job submitted");
    }

    /// Records job completion with timing.
    #[inline]
    pub fn record_completion(duration: Duration, success: bool) {
        let duration_ms = duration.as_millis() as u64;
        if success {
            tracing::trace!(
                counter.jobs_completed = 1,
                histogram.job_duration_ms = duration_ms,
                "job completed successfully"
            );
        } else {
            tracing::trace!(
                counter.jobs_failed = 1,
                histogram.job_duration_ms = duration_ms,
                "job failed"
            );
        }
    }

    /// Records a job panic event.
    #[inline]
    pub fn record_panic(duration: Duration) {
        tracing::trace!(
            counter.jobs_panicked = 1,
            histogram.job_duration_ms = duration.as_millis() as u64,
            "job panicked"
        );
    }

    /// Records a worker going to sleep on an empty queue.
    #[inline]
    pub fn worker_sleep() {
        tracing::trace!(gauge.workers_sleeping = 1, "worker sleeping");
    }

    /// Records a batch of jobs taken by a worker.
    #[inline]
    pub fn record_batch(worker: &str) {
        tracing::trace!(counter.batches = 1, worker = worker, "batch taken");
    }

    /// Records scheduler startup.
    #[inline]
    pub fn record_scheduler_start(name: &str, non_blocking: usize, blocking: usize) {
        tracing::info!(
            scheduler = name,
            non_blocking_workers = non_blocking,
            blocking_workers = blocking,
            "scheduler started"
        );
    }

    /// Records scheduler stop.
    #[inline]
    pub fn record_scheduler_stop(name: &str, jobs_processed: u64, jobs_failed: u64) {
        tracing::info!(
            scheduler = name,
            jobs_processed = jobs_processed,
            jobs_failed = jobs_failed,
            "scheduler stopped"
        );
    }
}
