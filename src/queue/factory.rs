//! Queue factory for capability-based queue creation.
//!
//! Picks a queue variant from a set of requirements so callers need not know
//! which combinations of variants and decorators satisfy them.
//!
//! # Example
//!
//! ```rust
//! use tiered_scheduler::queue::{JobQueue, QueueFactory, QueueRequirements};
//!
//! let queue = QueueFactory::create_shared(
//!     QueueRequirements::new().ordered().ring(64)
//! ).unwrap();
//! assert!(queue.maintains_order());
//! assert!(queue.is_thread_safe());
//!
//! // Ordering cannot be combined with a lock-free stack
//! assert!(QueueFactory::create(QueueRequirements::new().ordered().lock_free()).is_err());
//! ```

use super::{
    BoxedQueue, CapabilityFlags, JobQueue, LinkedRingQueue, ListQueue, LockFreeStack, Monitor,
    NotifyAllQueue, SharedQueue, StripedQueue, SynchronizedQueue, MAX_RING_SIZE,
};
use crate::core::error::{Result, SchedulerError};
use std::sync::Arc;

/// Synchronized FIFO queue that wakes its monitor's sleepers on push
pub type MonitoredQueue = NotifyAllQueue<SynchronizedQueue<ListQueue>, ListQueue>;

/// Requirements for queue creation.
///
/// ```rust
/// use tiered_scheduler::queue::QueueRequirements;
///
/// let requirements = QueueRequirements::new()
///     .thread_safe()
///     .striped(8);
/// ```
#[derive(Clone, Debug, Default)]
pub struct QueueRequirements {
    ordered: bool,
    thread_safe: bool,
    lock_free: bool,
    /// Segment size for the ring-buffer hybrid
    ring_size: Option<usize>,
    stripes: Option<usize>,
}

impl QueueRequirements {
    /// Creates a new empty requirements builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires FIFO ordering.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    /// Requires the queue to be usable from several threads.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn thread_safe(mut self) -> Self {
        self.thread_safe = true;
        self
    }

    /// Requires a lock-free implementation (implies thread-safe).
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn lock_free(mut self) -> Self {
        self.lock_free = true;
        self.thread_safe = true;
        self
    }

    /// Stores jobs in chained ring segments of `ring_size`.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn ring(mut self, ring_size: usize) -> Self {
        self.ring_size = Some(ring_size);
        self
    }

    /// Spreads jobs over `stripes` sub-queues (implies thread-safe).
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn striped(mut self, stripes: usize) -> Self {
        self.stripes = Some(stripes);
        self.thread_safe = true;
        self
    }

    /// The capability flags a matching queue reports
    pub fn flags(&self) -> CapabilityFlags {
        let mut flags = CapabilityFlags::empty();
        flags.set(CapabilityFlags::ORDERED, self.ordered);
        flags.set(CapabilityFlags::THREAD_SAFE, self.thread_safe);
        flags.set(CapabilityFlags::LOCK_FREE, self.lock_free);
        flags
    }
}

/// Factory for creating queue implementations based on requirements.
pub struct QueueFactory;

impl QueueFactory {
    /// Creates a queue matching the specified requirements.
    ///
    /// # Selection Logic
    ///
    /// | Requirements | Selected Queue |
    /// |-------------|----------------|
    /// | Default / `ordered()` | `ListQueue` |
    /// | `ring(n)` | `LinkedRingQueue` |
    /// | `thread_safe()` | `SynchronizedQueue` around the above |
    /// | `lock_free()` | `LockFreeStack` |
    /// | `striped(n)` | `StripedQueue` of n thread-safe stripes built by the rules above |
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if:
    /// - `ordered` + `lock_free` (the lock-free stack is unordered)
    /// - `ordered` + `striped` (striping gives up ordering)
    /// - `lock_free` + `ring` (ring segments are single-threaded)
    /// - a ring size or stripe count of zero
    pub fn create(requirements: QueueRequirements) -> Result<BoxedQueue> {
        Self::validate_requirements(&requirements)?;

        if requirements.thread_safe {
            return Ok(Box::new(Self::build_shared(&requirements)?));
        }
        Ok(match requirements.ring_size {
            Some(ring_size) => Box::new(LinkedRingQueue::new(ring_size)),
            None => Box::new(ListQueue::new()),
        })
    }

    /// Creates a thread-safe queue matching the specified requirements.
    ///
    /// `thread_safe()` is implied.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub fn create_shared(requirements: QueueRequirements) -> Result<SharedQueue> {
        let requirements = requirements.thread_safe();
        Self::validate_requirements(&requirements)?;
        Self::build_shared(&requirements)
    }

    /// Creates the queue used for stripes and the blocking tier: a
    /// synchronized FIFO list whose monitor is woken on every push.
    #[must_use]
    pub fn monitored() -> (Arc<Monitor<ListQueue>>, Arc<MonitoredQueue>) {
        let monitor = Arc::new(Monitor::new(ListQueue::new()));
        let queue = NotifyAllQueue::new(
            SynchronizedQueue::with_monitor(Arc::clone(&monitor)),
            Arc::clone(&monitor),
        );
        (monitor, Arc::new(queue))
    }

    fn build_shared(requirements: &QueueRequirements) -> Result<SharedQueue> {
        if let Some(stripes) = requirements.stripes {
            let stripe_requirements = QueueRequirements {
                stripes: None,
                ..requirements.clone()
            };
            let striped = StripedQueue::new(
                (0..stripes)
                    .map(|_| Self::build_shared(&stripe_requirements))
                    .collect::<Result<Vec<_>>>()?,
            )?;
            return Ok(Arc::new(striped));
        }

        if requirements.lock_free {
            return Ok(Arc::new(LockFreeStack::new()));
        }

        Ok(match requirements.ring_size {
            Some(ring_size) => Arc::new(SynchronizedQueue::new(LinkedRingQueue::new(ring_size))),
            None => Arc::new(SynchronizedQueue::new(ListQueue::new())),
        })
    }

    /// Validates that requirements are compatible.
    fn validate_requirements(req: &QueueRequirements) -> Result<()> {
        if req.ordered && req.lock_free {
            return Err(SchedulerError::invalid_config(
                "queue requirements",
                "the lock-free queue does not maintain order",
            ));
        }

        if req.ordered && req.stripes.is_some() {
            return Err(SchedulerError::invalid_config(
                "queue requirements",
                "a striped queue does not maintain order",
            ));
        }

        if req.lock_free && req.ring_size.is_some() {
            return Err(SchedulerError::invalid_config(
                "queue requirements",
                "ring segments cannot be lock-free",
            ));
        }

        if req.ring_size == Some(0) {
            return Err(SchedulerError::invalid_config(
                "ring_size",
                "must be greater than 0",
            ));
        }

        if req.ring_size.is_some_and(|size| size > MAX_RING_SIZE) {
            return Err(SchedulerError::invalid_config(
                "ring_size",
                format!("must not exceed {}", MAX_RING_SIZE),
            ));
        }

        if req.stripes == Some(0) {
            return Err(SchedulerError::invalid_config("stripes", "must be greater than 0"));
        }

        Ok(())
    }

    /// Checks if a queue satisfies the given requirements.
    pub fn satisfies(queue: &dyn JobQueue, requirements: &QueueRequirements) -> bool {
        queue.supports(requirements.flags())
    }

    /// Returns a human-readable description of what queue would be created.
    pub fn describe(requirements: &QueueRequirements) -> String {
        let base = if requirements.lock_free {
            "LockFreeStack".to_string()
        } else {
            let inner = match requirements.ring_size {
                Some(ring_size) => format!("LinkedRingQueue (ring size: {})", ring_size),
                None => "ListQueue".to_string(),
            };
            if requirements.thread_safe {
                format!("SynchronizedQueue<{}>", inner)
            } else {
                inner
            }
        };

        match requirements.stripes {
            Some(stripes) => format!("StripedQueue ({} x {})", stripes, base),
            None => base,
        }
    }
}
