//! Convenient re-exports for common types and traits

pub use crate::core::{
    ClosureJob, Completion, Job, JobFailure, JobId, Result, ScheduledJob, SchedulerError,
};
pub use crate::queue::{JobQueue, QueueCapabilities, QueueFactory, QueueRequirements};
pub use crate::scheduler::{JobContext, PrivateQueueKind, Scheduler, SchedulerConfig, WorkerStats};
pub use crate::tracing::TracedJob;
