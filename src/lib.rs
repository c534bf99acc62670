//! # Tiered Scheduler
//!
//! A multi-tier job scheduler built on a family of interchangeable job queues.
//!
//! ## Features
//!
//! - **Two worker tiers**: non-blocking workers for short CPU-bound jobs and a
//!   separate blocking pool for jobs that wait on I/O or locks
//! - **Private queues**: every non-blocking worker drains its own
//!   unsynchronized queue before touching shared state
//! - **Striped public queue**: external submissions are spread over one stripe
//!   per non-blocking worker to cut lock contention
//! - **Completion handles**: every submission returns a [`Completion`] that
//!   resolves with the job's value or its failure
//! - **Queue family**: list, ring, lock-free stack and striped queues plus
//!   synchronizing, notifying and blocking decorators, all behind one
//!   [`JobQueue`](queue::JobQueue) contract
//!
//! ## Quick Start
//!
//! ```rust
//! use tiered_scheduler::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let scheduler = Scheduler::with_threads("quickstart", 4, 2)?;
//! scheduler.start()?;
//!
//! let handles = (0..10)
//!     .map(|i| scheduler.execute(move |_ctx| Ok(i * 2)))
//!     .collect::<Result<Vec<_>>>()?;
//!
//! for handle in &handles {
//!     println!("{}", handle.wait_timeout(Duration::from_secs(1))?);
//! }
//!
//! scheduler.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Jobs
//!
//! Jobs receive a [`JobContext`] they can use to schedule follow-up work on
//! the same scheduler.
//!
//! ```rust
//! use tiered_scheduler::prelude::*;
//! use std::time::Duration;
//!
//! struct WordCount {
//!     text: String,
//! }
//!
//! impl Job for WordCount {
//!     type Output = usize;
//!
//!     fn invoke(&mut self, _ctx: &JobContext) -> Result<usize> {
//!         Ok(self.text.split_whitespace().count())
//!     }
//!
//!     fn job_type(&self) -> &str {
//!         "WordCount"
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! # let scheduler = Scheduler::with_threads("custom", 2, 1)?;
//! # scheduler.start()?;
//! let count = scheduler.schedule(WordCount {
//!     text: "the quick brown fox".to_string(),
//! })?;
//! assert_eq!(*count.wait_timeout(Duration::from_secs(1))?, 4);
//! # scheduler.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Worker Statistics
//!
//! ```rust
//! use tiered_scheduler::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! # let scheduler = Scheduler::with_threads("stats", 2, 1)?;
//! # scheduler.start()?;
//! # for _ in 0..10 {
//! #     scheduler.execute(|_ctx| Ok(()))?.wait_timeout(Duration::from_secs(1))?;
//! # }
//! let stats = scheduler.get_stats();
//! for (i, stat) in stats.iter().enumerate() {
//!     println!("Worker {}: {} jobs processed", i, stat.get_jobs_processed());
//! }
//!
//! println!("Total jobs: {}", scheduler.total_jobs_processed());
//! # scheduler.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod prelude;
pub mod queue;
pub mod scheduler;
pub mod tracing;

pub use crate::core::{ClosureJob, Completion, Job, JobFailure, JobId, Result, SchedulerError};
pub use crate::scheduler::{JobContext, Scheduler, SchedulerConfig, WorkerStats};
