//! The multi-tier scheduler and the context handed to running jobs

pub mod config;
pub mod context;
pub mod multi_tier;
pub mod worker;

pub use config::{PrivateQueueKind, SchedulerConfig};
pub use context::JobContext;
pub use multi_tier::Scheduler;
pub use worker::WorkerStats;
