//! Write-once completion handles
//!
//! A [`Completion`] is created when a job is scheduled and is shared between
//! the submitter, who reads it, and the worker that runs the job, who writes
//! it exactly once.
//!
//! # Example
//!
//! ```rust
//! use tiered_scheduler::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let scheduler = Scheduler::with_threads("doc", 2, 1)?;
//! scheduler.start()?;
//!
//! let completion = scheduler.execute(|_ctx| Ok(6 * 7))?;
//! assert_eq!(*completion.wait_timeout(Duration::from_secs(1))?, 42);
//! # scheduler.shutdown()?;
//! # Ok(())
//! # }
//! ```

use crate::core::error::{JobFailure, Result, SchedulerError};
use crate::core::job::{panic_message, JobId};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

type Outcome<T> = std::result::Result<T, JobFailure>;
type Listener<T> = Box<dyn FnOnce(std::result::Result<&T, &JobFailure>) + Send>;

struct CompletionInner<T> {
    job_id: JobId,
    outcome: OnceLock<Outcome<T>>,
    /// `None` once the listeners have fired
    listeners: Mutex<Option<Vec<Listener<T>>>>,
    completed: Condvar,
}

/// Handle to the eventual outcome of a scheduled job.
///
/// The transition from pending to completed happens exactly once, either
/// with a value or with a [`JobFailure`]. Clones share the same outcome.
pub struct Completion<T> {
    inner: Arc<CompletionInner<T>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.outcome.get() {
            None => "pending",
            Some(Ok(_)) => "succeeded",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("Completion")
            .field("job_id", &self.inner.job_id)
            .field("state", &state)
            .finish()
    }
}

impl<T: Send + 'static> Completion<T> {
    pub(crate) fn new(job_id: JobId) -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                job_id,
                outcome: OnceLock::new(),
                listeners: Mutex::new(Some(Vec::new())),
                completed: Condvar::new(),
            }),
        }
    }

    /// The job this handle belongs to
    pub fn job_id(&self) -> JobId {
        self.inner.job_id
    }

    /// Returns `true` once the job has succeeded or failed
    pub fn is_complete(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    /// Returns `true` if the job completed with a failure
    pub fn is_failed(&self) -> bool {
        matches!(self.inner.outcome.get(), Some(Err(_)))
    }

    /// Complete the handle with a value.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyCompleted`] if the handle was already
    /// completed; the earlier outcome is kept.
    pub fn complete_with_result(&self, value: T) -> Result<()> {
        self.try_settle(Ok(value))
    }

    /// Complete the handle with a failure carrying `message`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyCompleted`] if the handle was already
    /// completed; the earlier outcome is kept.
    pub fn complete_with_error(&self, message: impl Into<String>) -> Result<()> {
        let failure = JobFailure::failed(self.inner.job_id, "Job", message);
        self.try_settle(Err(failure))
    }

    /// Settle from the worker side; a handle that is already complete keeps
    /// its first outcome.
    pub(crate) fn settle(&self, outcome: Outcome<T>) {
        if self.try_settle(outcome).is_err() {
            log::debug!("{} was completed more than once", self.inner.job_id);
        }
    }

    fn try_settle(&self, outcome: Outcome<T>) -> Result<()> {
        if self.inner.outcome.set(outcome).is_err() {
            return Err(SchedulerError::already_completed(self.inner.job_id));
        }

        let listeners = {
            let mut guard = self.inner.listeners.lock();
            self.inner.completed.notify_all();
            guard.take().unwrap_or_default()
        };

        if let Some(outcome) = self.inner.outcome.get() {
            for listener in listeners {
                self.notify(listener, outcome);
            }
        }
        Ok(())
    }

    fn notify(&self, listener: Listener<T>, outcome: &Outcome<T>) {
        if let Err(panic_info) = catch_unwind(AssertUnwindSafe(|| listener(outcome.as_ref()))) {
            log::error!(
                "completion listener for {} panicked: {}",
                self.inner.job_id,
                panic_message(panic_info.as_ref())
            );
        }
    }

    /// The value, if the job has succeeded
    pub fn result(&self) -> Option<&T> {
        match self.inner.outcome.get() {
            Some(Ok(value)) => Some(value),
            _ => None,
        }
    }

    /// The failure, if the job has failed
    pub fn error(&self) -> Option<&JobFailure> {
        match self.inner.outcome.get() {
            Some(Err(failure)) => Some(failure),
            _ => None,
        }
    }

    /// Register a callback that runs exactly once when the job completes.
    ///
    /// Runs immediately on the calling thread if the job has already
    /// completed, otherwise on the thread that completes it.
    pub fn on_complete<F>(&self, listener: F)
    where
        F: FnOnce(std::result::Result<&T, &JobFailure>) + Send + 'static,
    {
        let mut guard = self.inner.listeners.lock();
        if let Some(pending) = guard.as_mut() {
            if self.inner.outcome.get().is_none() {
                pending.push(Box::new(listener));
                return;
            }
        }
        drop(guard);

        if let Some(outcome) = self.inner.outcome.get() {
            self.notify(Box::new(listener), outcome);
        }
    }

    /// Block until the job completes.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::JobFailed`] if the job failed.
    pub fn wait(&self) -> Result<&T> {
        let mut guard = self.inner.listeners.lock();
        while self.inner.outcome.get().is_none() {
            self.inner.completed.wait(&mut guard);
        }
        drop(guard);
        self.outcome()
    }

    /// Block until the job completes or `timeout` elapses.
    ///
    /// The job keeps running after a timeout; only the wait is abandoned.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::WaitTimeout`] if the job is still pending
    /// - [`SchedulerError::JobFailed`] if the job failed
    pub fn wait_timeout(&self, timeout: Duration) -> Result<&T> {
        // A timeout past the end of the clock means wait forever.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait();
        };
        let mut guard = self.inner.listeners.lock();
        while self.inner.outcome.get().is_none() {
            if self
                .inner
                .completed
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                break;
            }
        }
        drop(guard);

        if self.inner.outcome.get().is_none() {
            return Err(SchedulerError::wait_timeout(
                self.inner.job_id,
                timeout.as_millis() as u64,
            ));
        }
        self.outcome()
    }

    fn outcome(&self) -> Result<&T> {
        match self.inner.outcome.get() {
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(failure.clone().into()),
            None => Err(SchedulerError::other(format!(
                "{} has not completed",
                self.inner.job_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn handle<T: Send + 'static>() -> Completion<T> {
        Completion::new(JobId::from_raw(1))
    }

    #[test]
    fn test_pending_state() {
        let completion = handle::<u32>();
        assert!(!completion.is_complete());
        assert!(completion.result().is_none());
        assert!(completion.error().is_none());
    }

    #[test]
    fn test_complete_exactly_once() {
        let completion = handle::<u32>();
        completion.complete_with_result(5).expect("first completion");

        let second = completion.complete_with_result(6);
        assert!(matches!(second, Err(SchedulerError::AlreadyCompleted { .. })));

        let third = completion.complete_with_error("late");
        assert!(matches!(third, Err(SchedulerError::AlreadyCompleted { .. })));

        assert_eq!(completion.result(), Some(&5));
        assert!(!completion.is_failed());
    }

    #[test]
    fn test_complete_with_error() {
        let completion = handle::<u32>();
        completion.complete_with_error("nope").expect("first completion");

        assert!(completion.is_failed());
        assert_eq!(completion.error().map(|f| f.message()), Some("nope"));
        assert!(matches!(completion.wait(), Err(SchedulerError::JobFailed(_))));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let completion = handle::<u32>();
        let start = Instant::now();
        let result = completion.wait_timeout(Duration::from_millis(30));

        assert!(matches!(result, Err(SchedulerError::WaitTimeout { timeout_ms: 30, .. })));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_wait_timeout_unbounded_duration() {
        let completion = handle::<u32>();
        let writer = completion.clone();

        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            writer.complete_with_result(5).expect("complete");
        });

        let value = completion
            .wait_timeout(Duration::MAX)
            .expect("value should arrive");
        assert_eq!(*value, 5);
        t.join().expect("writer panicked");
    }

    #[test]
    fn test_wait_timeout_wakes_on_completion() {
        let completion = handle::<String>();
        let writer = completion.clone();

        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.complete_with_result("ready".to_string()).expect("complete");
        });

        let value = completion
            .wait_timeout(Duration::from_secs(5))
            .expect("value should arrive");
        assert_eq!(value, "ready");
        t.join().expect("writer panicked");
    }

    #[test]
    fn test_listener_runs_once_on_completion() {
        let completion = handle::<u32>();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = Arc::clone(&calls);
        completion.on_complete(move |outcome| {
            assert_eq!(outcome.ok(), Some(&9));
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        completion.complete_with_result(9).expect("complete");
        let _ = completion.complete_with_result(10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_after_completion_runs_immediately() {
        let completion = handle::<u32>();
        completion.complete_with_error("failed early").expect("complete");

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        completion.on_complete(move |outcome| {
            assert!(outcome.is_err());
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let completion = handle::<u32>();
        completion.on_complete(|_| panic!("listener bug"));
        completion.complete_with_result(1).expect("complete");
        assert_eq!(completion.result(), Some(&1));
    }
}
