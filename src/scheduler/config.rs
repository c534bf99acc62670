//! Scheduler configuration

use crate::core::error::{Result, SchedulerError};
use crate::queue::{JobQueue, LinkedRingQueue, ListQueue, MAX_RING_SIZE};
use std::rc::Rc;
use std::time::Duration;

/// Which single-threaded queue backs each non-blocking worker's private queue
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrivateQueueKind {
    /// [`ListQueue`]
    #[default]
    Linked,
    /// [`LinkedRingQueue`] with segments of `ring_size` jobs
    Ring {
        /// Jobs per ring segment, rounded up to a power of two
        ring_size: usize,
    },
}

impl PrivateQueueKind {
    pub(crate) fn build(self) -> Rc<dyn JobQueue> {
        match self {
            PrivateQueueKind::Linked => Rc::new(ListQueue::new()),
            PrivateQueueKind::Ring { ring_size } => Rc::new(LinkedRingQueue::new(ring_size)),
        }
    }
}

/// Configuration for the multi-tier scheduler
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Scheduler name, used in thread names and error messages
    pub name: String,
    /// Number of non-blocking worker threads, one per public stripe
    pub non_blocking_threads: usize,
    /// Number of worker threads serving blockable jobs
    pub blocking_threads: usize,
    /// Upper bound on a single idle sleep.
    /// Default: 100ms
    ///
    /// Workers are woken by pushes and by stop; this only bounds how long a
    /// missed wake-up can delay them.
    pub poll_interval: Duration,
    /// Private queue variant for non-blocking workers
    pub private_queue: PrivateQueueKind,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "scheduler".to_string(),
            non_blocking_threads: num_cpus::get(),
            blocking_threads: num_cpus::get() * 4,
            poll_interval: Duration::from_millis(100),
            private_queue: PrivateQueueKind::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with core-count defaults
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the number of non-blocking worker threads
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_non_blocking_threads(mut self, threads: usize) -> Self {
        self.non_blocking_threads = threads;
        self
    }

    /// Set the number of blocking worker threads
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_blocking_threads(mut self, threads: usize) -> Self {
        self.blocking_threads = threads;
        self
    }

    /// Set the idle sleep bound. Must be non-zero; checked by
    /// [`validate`](Self::validate).
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the private queue variant
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_private_queue(mut self, kind: PrivateQueueKind) -> Self {
        self.private_queue = kind;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::invalid_config(
                "name",
                "Scheduler name must not be blank",
            ));
        }
        if self.non_blocking_threads == 0 && self.blocking_threads == 0 {
            return Err(SchedulerError::invalid_config(
                "threads",
                "At least one tier must have a worker thread",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SchedulerError::invalid_config(
                "poll_interval",
                "Poll interval must be non-zero",
            ));
        }
        if let PrivateQueueKind::Ring { ring_size } = self.private_queue {
            if ring_size == 0 {
                return Err(SchedulerError::invalid_config(
                    "ring_size",
                    "Ring size must be greater than 0",
                ));
            }
            if ring_size > MAX_RING_SIZE {
                return Err(SchedulerError::invalid_config(
                    "ring_size",
                    format!("Ring size must not exceed {}", MAX_RING_SIZE),
                ));
            }
        }
        Ok(())
    }
}
