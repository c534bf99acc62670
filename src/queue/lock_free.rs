//! Lock-free job stack
//!
//! A Treiber stack over `crossbeam::epoch`. Nodes unlinked by `pop` or
//! `bulk_pop` are reclaimed only once no pinned thread can still observe
//! them, which also rules out ABA on the head pointer.

use super::{BoxedQueue, JobQueue, ListQueue, QueueCapabilities};
use crate::core::job::ScheduledJob;
use crossbeam::epoch::{self, Atomic, Owned, Shared};
use crossbeam::utils::Backoff;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::Ordering;

struct Node {
    job: ManuallyDrop<ScheduledJob>,
    next: Atomic<Node>,
}

/// Unordered multi-producer multi-consumer queue built on compare-and-swap.
///
/// Recently pushed jobs tend to be served first, so under sustained load
/// older jobs can wait. This is a throughput trade-off; use an ordered
/// queue when FIFO matters.
pub struct LockFreeStack {
    head: Atomic<Node>,
}

impl LockFreeStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }
}

impl Default for LockFreeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockFreeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeStack")
            .field("empty", &self.is_empty())
            .finish()
    }
}

impl JobQueue for LockFreeStack {
    fn capabilities(&self) -> QueueCapabilities {
        QueueCapabilities {
            thread_safe: true,
            lock_free: true,
            implementation_name: "LockFreeStack",
            ..QueueCapabilities::default()
        }
    }

    fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }

    fn push(&self, job: ScheduledJob) {
        let mut node = Owned::new(Node {
            job: ManuallyDrop::new(job),
            next: Atomic::null(),
        });
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Relaxed, &guard);
            node.next.store(head, Ordering::Relaxed);

            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => return,
                Err(e) => {
                    node = e.new;
                    backoff.spin();
                }
            }
        }
    }

    fn pop(&self) -> Option<ScheduledJob> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            // SAFETY: the guard keeps any node reachable from head alive.
            let node = unsafe { head.as_ref() }?;
            let next = node.next.load(Ordering::Relaxed, &guard);

            if self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, &guard)
                .is_ok()
            {
                // SAFETY: the successful CAS unlinked the node, so this thread
                // is the only one that will read its job. The node itself is
                // freed after every current pin is released.
                unsafe {
                    let job = ManuallyDrop::into_inner(ptr::read(&node.job));
                    guard.defer_destroy(head);
                    return Some(job);
                }
            }
            backoff.spin();
        }
    }

    fn bulk_pop(&self) -> BoxedQueue {
        let guard = epoch::pin();
        let mut current = self.head.swap(Shared::null(), Ordering::AcqRel, &guard);
        let drained = ListQueue::new();

        // SAFETY: the swap detached the whole chain; concurrent poppers that
        // loaded an old head fail their CAS and never read a job from it.
        while let Some(node) = unsafe { current.as_ref() } {
            let next = node.next.load(Ordering::Acquire, &guard);
            unsafe {
                drained.push(ManuallyDrop::into_inner(ptr::read(&node.job)));
                guard.defer_destroy(current);
            }
            current = next;
        }

        Box::new(drained)
    }
}

impl Drop for LockFreeStack {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

// Safety: LockFreeStack is Send + Sync because:
// - the head is only modified through atomic compare-and-swap
// - each job is moved out exactly once, by the thread whose CAS unlinked it
// - jobs are never accessed by reference from more than one thread
unsafe impl Send for LockFreeStack {}
unsafe impl Sync for LockFreeStack {}
