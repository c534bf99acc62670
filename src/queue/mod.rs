//! Interchangeable job queue implementations.
//!
//! Every queue implements the [`JobQueue`] contract: push, pop, an atomic
//! snapshot drain ([`bulk_pop`](JobQueue::bulk_pop)), emptiness checks and
//! capability introspection.
//!
//! # Built-in Implementations
//!
//! - [`ListQueue`]: FIFO, single-threaded
//! - [`LockFreeStack`]: CAS-based stack, unordered, multi-producer multi-consumer
//! - [`LinkedRingQueue`]: FIFO, single-threaded, chained ring segments
//! - [`StripedQueue`]: unordered composite that spreads jobs over N sub-queues
//! - [`PublicPrivateQueue`]: union that serves a private queue before a public one
//!
//! Decorators add synchronization on top of any queue:
//! [`SynchronizedQueue`], [`NotifyAllQueue`] and [`BlockingQueue`], all built
//! around a shared [`Monitor`].
//!
//! # Queue Capability Introspection
//!
//! ```rust
//! use tiered_scheduler::queue::{CapabilityFlags, JobQueue, LockFreeStack};
//!
//! let queue = LockFreeStack::new();
//! println!("{}", queue.capabilities().describe());
//! // Output: "LockFreeStack: [unordered, thread-safe, lock-free]"
//!
//! assert!(queue.supports(CapabilityFlags::THREAD_SAFE | CapabilityFlags::LOCK_FREE));
//! assert!(!queue.maintains_order());
//! ```
//!
//! Thread safety is also enforced by the type system: the single-threaded
//! queues are `!Sync`, so only the thread-safe variants fit in a
//! [`SharedQueue`].

mod decorators;
mod factory;
mod list;
mod lock_free;
mod monitor;
mod public_private;
mod ring;
mod striped;

pub use decorators::{BlockingQueue, NotifyAllQueue, SynchronizedQueue};
pub use factory::{MonitoredQueue, QueueFactory, QueueRequirements};
pub use list::ListQueue;
pub use lock_free::LockFreeStack;
pub use monitor::Monitor;
pub use public_private::PublicPrivateQueue;
pub use ring::{LinkedRingQueue, MAX_RING_SIZE};
pub use striped::StripedQueue;

use crate::core::error::{Result, SchedulerError};
use crate::core::job::ScheduledJob;
use bitflags::bitflags;
use std::rc::Rc;
use std::sync::Arc;

/// Queue returned by [`JobQueue::bulk_pop`], owned by the caller
pub type BoxedQueue = Box<dyn JobQueue + Send>;

/// Queue that can be shared between threads
pub type SharedQueue = Arc<dyn JobQueue + Send + Sync>;

bitflags! {
    /// Flags for specifying required queue capabilities.
    ///
    /// Combine them and check with [`JobQueue::supports()`] or
    /// [`require_capabilities()`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CapabilityFlags: u32 {
        /// Jobs are popped in the order they were pushed
        const ORDERED = 1 << 0;
        /// Safe to use from several threads without an external lock
        const THREAD_SAFE = 1 << 1;
        /// Never blocks on a lock
        const LOCK_FREE = 1 << 2;
        /// `bulk_pop` may leave jobs behind (returns part of the contents)
        const PARTIAL_BULK_POP = 1 << 3;
        /// `pop`/`bulk_pop` sleep when the queue is empty
        const BLOCKING = 1 << 4;
        /// `push` wakes sleeping consumers
        const NOTIFYING = 1 << 5;
    }
}

/// Capabilities of a queue implementation for runtime introspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueCapabilities {
    /// Whether jobs are popped in push order
    pub maintains_order: bool,
    /// Whether concurrent use needs no external lock
    pub thread_safe: bool,
    /// Whether the queue uses lock-free algorithms
    pub lock_free: bool,
    /// Whether `bulk_pop` may return only part of the contents
    pub partial_bulk_pop: bool,
    /// Whether empty pops sleep on a monitor
    pub blocking: bool,
    /// Whether pushes wake sleeping consumers
    pub notifying: bool,
    /// Queue implementation name for debugging/logging
    pub implementation_name: &'static str,
}

impl Default for QueueCapabilities {
    fn default() -> Self {
        Self {
            maintains_order: false,
            thread_safe: false,
            lock_free: false,
            partial_bulk_pop: false,
            blocking: false,
            notifying: false,
            implementation_name: "unknown",
        }
    }
}

impl QueueCapabilities {
    /// Capabilities of an ordered queue that needs an external lock.
    pub fn ordered_local(implementation_name: &'static str) -> Self {
        Self {
            maintains_order: true,
            implementation_name,
            ..Self::default()
        }
    }

    /// Returns a human-readable description of the queue capabilities.
    ///
    /// ```rust
    /// use tiered_scheduler::queue::{JobQueue, ListQueue};
    ///
    /// let queue = ListQueue::new();
    /// assert_eq!(queue.capabilities().describe(), "ListQueue: [ordered, local]");
    /// ```
    pub fn describe(&self) -> String {
        let mut features = Vec::new();

        features.push(if self.maintains_order { "ordered" } else { "unordered" });
        features.push(if self.thread_safe { "thread-safe" } else { "local" });

        if self.lock_free {
            features.push("lock-free");
        }
        if self.partial_bulk_pop {
            features.push("partial-bulk-pop");
        }
        if self.blocking {
            features.push("blocking");
        }
        if self.notifying {
            features.push("notifying");
        }

        format!("{}: [{}]", self.implementation_name, features.join(", "))
    }

    /// Checks if these capabilities satisfy the given flags.
    ///
    /// Returns `true` if all required capabilities are present.
    pub fn satisfies(&self, flags: CapabilityFlags) -> bool {
        self.missing(flags).is_empty()
    }

    fn missing(&self, flags: CapabilityFlags) -> Vec<&'static str> {
        let checks = [
            (CapabilityFlags::ORDERED, self.maintains_order, "ordered"),
            (CapabilityFlags::THREAD_SAFE, self.thread_safe, "thread-safe"),
            (CapabilityFlags::LOCK_FREE, self.lock_free, "lock-free"),
            (
                CapabilityFlags::PARTIAL_BULK_POP,
                self.partial_bulk_pop,
                "partial-bulk-pop",
            ),
            (CapabilityFlags::BLOCKING, self.blocking, "blocking"),
            (CapabilityFlags::NOTIFYING, self.notifying, "notifying"),
        ];

        checks
            .iter()
            .filter(|(flag, present, _)| flags.contains(*flag) && !present)
            .map(|(_, _, name)| *name)
            .collect()
    }
}

/// Checks if a queue supports the required capabilities.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] naming the missing capabilities.
pub fn require_capabilities(queue: &dyn JobQueue, flags: CapabilityFlags) -> Result<()> {
    let caps = queue.capabilities();
    let missing = caps.missing(flags);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchedulerError::invalid_config(
            caps.implementation_name,
            format!("missing required capabilities: [{}]", missing.join(", ")),
        ))
    }
}

/// Contract shared by every job queue.
///
/// All methods take `&self`; queues that are not thread-safe use interior
/// mutability and are `!Sync`, so the compiler keeps them on one thread.
///
/// No operation ever duplicates or loses a job. A job dropped together with
/// its queue completes its handle with a failure.
pub trait JobQueue {
    /// Returns the capabilities of this queue implementation.
    fn capabilities(&self) -> QueueCapabilities;

    /// Whether jobs are popped in the order they were pushed
    fn maintains_order(&self) -> bool {
        self.capabilities().maintains_order
    }

    /// Whether the queue may be used concurrently without an external lock
    fn is_thread_safe(&self) -> bool {
        self.capabilities().thread_safe
    }

    /// Returns `true` if the queue holds no jobs.
    fn is_empty(&self) -> bool;

    /// Returns `true` if the queue holds at least one job.
    fn has_contents(&self) -> bool {
        !self.is_empty()
    }

    /// Adds a job to the queue.
    fn push(&self, job: ScheduledJob);

    /// Removes one job, or returns `None` if the queue is empty.
    fn pop(&self) -> Option<ScheduledJob>;

    /// Atomically removes a snapshot of the queue's contents and returns it
    /// as a new queue for exclusive consumption by the caller.
    ///
    /// The returned queue need not be thread-safe. Variants flagged
    /// [`PARTIAL_BULK_POP`](CapabilityFlags::PARTIAL_BULK_POP) may leave
    /// jobs behind; repeated calls eventually drain everything.
    fn bulk_pop(&self) -> BoxedQueue;

    /// Checks if this queue supports the required capabilities.
    fn supports(&self, flags: CapabilityFlags) -> bool {
        self.capabilities().satisfies(flags)
    }
}

impl<Q: JobQueue + ?Sized> JobQueue for Box<Q> {
    fn capabilities(&self) -> QueueCapabilities {
        (**self).capabilities()
    }
    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }
    fn push(&self, job: ScheduledJob) {
        (**self).push(job)
    }
    fn pop(&self) -> Option<ScheduledJob> {
        (**self).pop()
    }
    fn bulk_pop(&self) -> BoxedQueue {
        (**self).bulk_pop()
    }
}

impl<Q: JobQueue + ?Sized> JobQueue for Arc<Q> {
    fn capabilities(&self) -> QueueCapabilities {
        (**self).capabilities()
    }
    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }
    fn push(&self, job: ScheduledJob) {
        (**self).push(job)
    }
    fn pop(&self) -> Option<ScheduledJob> {
        (**self).pop()
    }
    fn bulk_pop(&self) -> BoxedQueue {
        (**self).bulk_pop()
    }
}

impl<Q: JobQueue + ?Sized> JobQueue for Rc<Q> {
    fn capabilities(&self) -> QueueCapabilities {
        (**self).capabilities()
    }
    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }
    fn push(&self, job: ScheduledJob) {
        (**self).push(job)
    }
    fn pop(&self) -> Option<ScheduledJob> {
        (**self).pop()
    }
    fn bulk_pop(&self) -> BoxedQueue {
        (**self).bulk_pop()
    }
}
