//! Core types: jobs, completion handles and errors

pub mod completion;
pub mod error;
pub mod job;

pub use completion::Completion;
pub use error::{JobFailure, Result, SchedulerError};
pub use job::{ClosureJob, Job, JobId, ScheduledJob};
