//! Error types for the scheduler

use crate::core::job::JobId;

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors that can occur in the scheduler
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SchedulerError {
    /// Scheduler is stopped and cannot accept work
    #[error("Scheduler '{scheduler}' is not running")]
    NotRunning {
        /// Name of the scheduler
        scheduler: String,
    },

    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// Failed to spawn a worker thread with details
    #[error("Failed to spawn worker thread '{thread_name}': {message}")]
    SpawnError {
        /// Name of the thread that failed to spawn
        thread_name: String,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: std::io::Error,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread '{thread_name}': {message}")]
    JoinError {
        /// Name of the thread that failed to join
        thread_name: String,
        /// Error message
        message: String,
    },

    /// The job completed with a failure
    #[error(transparent)]
    JobFailed(#[from] JobFailure),

    /// Waiting on a completion handle timed out before the job finished
    #[error("Timed out after {timeout_ms}ms waiting for {job_id}")]
    WaitTimeout {
        /// Job being waited on
        job_id: JobId,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// A completion handle was completed a second time
    #[error("{job_id} has already been completed")]
    AlreadyCompleted {
        /// Job whose handle was already completed
        job_id: JobId,
    },

    /// General error
    #[error("{0}")]
    Other(String),
}

impl SchedulerError {
    /// Create a not running error
    pub fn not_running(scheduler: impl Into<String>) -> Self {
        SchedulerError::NotRunning {
            scheduler: scheduler.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulerError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a spawn error from the OS failure
    pub fn spawn(
        thread_name: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        SchedulerError::SpawnError {
            thread_name: thread_name.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a join error
    pub fn join(thread_name: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulerError::JoinError {
            thread_name: thread_name.into(),
            message: message.into(),
        }
    }

    /// Create a wait timeout error
    pub fn wait_timeout(job_id: JobId, timeout_ms: u64) -> Self {
        SchedulerError::WaitTimeout { job_id, timeout_ms }
    }

    /// Create an already completed error
    pub fn already_completed(job_id: JobId) -> Self {
        SchedulerError::AlreadyCompleted { job_id }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SchedulerError::Other(msg.into())
    }
}

/// The failure recorded in a completion handle.
///
/// Unlike [`SchedulerError`] this is cheap to clone, so every reader of a
/// handle can observe the same failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{job_id} ({job_type}) {}: {message}", outcome_verb(.panicked))]
pub struct JobFailure {
    job_id: JobId,
    job_type: String,
    message: String,
    panicked: bool,
}

impl JobFailure {
    /// Create a failure for a job that returned an error
    pub fn failed(job_id: JobId, job_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            job_id,
            job_type: job_type.into(),
            message: message.into(),
            panicked: false,
        }
    }

    /// Create a failure for a job that panicked
    pub fn panicked(job_id: JobId, job_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            job_id,
            job_type: job_type.into(),
            message: message.into(),
            panicked: true,
        }
    }

    /// The job that failed
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// The failed job's type name
    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// The error or panic message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the job panicked rather than returning an error
    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

fn outcome_verb(panicked: &bool) -> &'static str {
    if *panicked {
        "panicked"
    } else {
        "failed"
    }
}
