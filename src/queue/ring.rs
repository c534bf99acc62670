//! Ring-buffer hybrid queue
//!
//! While consumers keep up with producers, jobs live in one pre-allocated
//! ring. When producers outpace consumers a further ring is chained on, so
//! the queue never rejects a push. Segments are consumed oldest first.

use super::{BoxedQueue, JobQueue, ListQueue, QueueCapabilities};
use crate::core::job::ScheduledJob;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

/// Largest segment capacity a [`LinkedRingQueue`] accepts
pub const MAX_RING_SIZE: usize = 1 << 24;

/// Fixed-capacity circular buffer; capacity is a power of two.
struct Ring {
    slots: Box<[Option<ScheduledJob>]>,
    /// Monotonic cursors, masked on access
    insert_at: usize,
    pop_at: usize,
}

impl Ring {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            insert_at: 0,
            pop_at: 0,
        }
    }

    fn starting_with(capacity: usize, job: ScheduledJob) -> Self {
        let mut ring = Self::with_capacity(capacity);
        ring.slots[0] = Some(job);
        ring.insert_at = 1;
        ring
    }

    fn mask(&self, cursor: usize) -> usize {
        cursor & (self.slots.len() - 1)
    }

    fn len(&self) -> usize {
        self.insert_at - self.pop_at
    }

    fn is_empty(&self) -> bool {
        self.insert_at == self.pop_at
    }

    fn is_full(&self) -> bool {
        self.len() == self.slots.len()
    }

    fn insert(&mut self, job: ScheduledJob) -> Result<(), ScheduledJob> {
        if self.is_full() {
            return Err(job);
        }
        let slot = self.mask(self.insert_at);
        self.slots[slot] = Some(job);
        self.insert_at += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<ScheduledJob> {
        if self.is_empty() {
            return None;
        }
        let slot = self.mask(self.pop_at);
        self.pop_at += 1;
        self.slots[slot].take()
    }
}

/// Ordered single-threaded queue built from chained ring segments.
///
/// `bulk_pop` hands out the oldest segment whole, so one call never returns
/// more than `ring_size` jobs. When the last segment is handed out a fresh
/// one replaces it.
pub struct LinkedRingQueue {
    segments: RefCell<VecDeque<Ring>>,
    ring_size: usize,
}

impl LinkedRingQueue {
    /// Create a queue whose segments hold `ring_size` jobs, rounded up to the
    /// next power of two and capped at [`MAX_RING_SIZE`].
    pub fn new(ring_size: usize) -> Self {
        let ring_size = ring_size.clamp(1, MAX_RING_SIZE).next_power_of_two();
        Self::from_ring(Ring::with_capacity(ring_size))
    }

    fn from_ring(ring: Ring) -> Self {
        let ring_size = ring.slots.len();
        let mut segments = VecDeque::with_capacity(2);
        segments.push_back(ring);
        Self {
            segments: RefCell::new(segments),
            ring_size,
        }
    }

    /// Capacity of each segment
    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    /// Number of segments currently chained
    pub fn segment_count(&self) -> usize {
        self.segments.borrow().len()
    }

    /// Number of queued jobs
    pub fn len(&self) -> usize {
        self.segments.borrow().iter().map(Ring::len).sum()
    }
}

impl fmt::Debug for LinkedRingQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedRingQueue")
            .field("ring_size", &self.ring_size)
            .field("segments", &self.segment_count())
            .field("len", &self.len())
            .finish()
    }
}

impl JobQueue for LinkedRingQueue {
    fn capabilities(&self) -> QueueCapabilities {
        QueueCapabilities {
            partial_bulk_pop: true,
            ..QueueCapabilities::ordered_local("LinkedRingQueue")
        }
    }

    fn is_empty(&self) -> bool {
        self.segments.borrow().iter().all(Ring::is_empty)
    }

    fn push(&self, job: ScheduledJob) {
        let mut segments = self.segments.borrow_mut();
        let job = match segments.back_mut() {
            Some(back) => match back.insert(job) {
                Ok(()) => return,
                Err(job) => job,
            },
            None => job,
        };

        segments.push_back(Ring::starting_with(self.ring_size, job));
    }

    fn pop(&self) -> Option<ScheduledJob> {
        let mut segments = self.segments.borrow_mut();
        loop {
            let front = segments.front_mut()?;
            if let Some(job) = front.pop() {
                return Some(job);
            }
            if segments.len() == 1 {
                return None;
            }
            segments.pop_front();
        }
    }

    fn bulk_pop(&self) -> BoxedQueue {
        let mut segments = self.segments.borrow_mut();
        while segments.len() > 1 && segments.front().map_or(false, Ring::is_empty) {
            segments.pop_front();
        }

        match segments.front() {
            Some(front) if !front.is_empty() => {}
            _ => return Box::new(ListQueue::new()),
        }

        let oldest = match segments.pop_front() {
            Some(ring) => ring,
            None => return Box::new(ListQueue::new()),
        };
        if segments.is_empty() {
            segments.push_back(Ring::with_capacity(self.ring_size));
        }
        Box::new(LinkedRingQueue::from_ring(oldest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::{ClosureJob, JobId};
    use crate::scheduler::JobContext;

    fn job() -> ScheduledJob {
        ScheduledJob::new(ClosureJob::new(|_ctx: &JobContext| Ok(()))).0
    }

    fn drain(queue: &dyn JobQueue) -> Vec<JobId> {
        std::iter::from_fn(|| queue.pop()).map(|j| j.id()).collect()
    }

    #[test]
    fn test_ring_size_rounds_up() {
        assert_eq!(LinkedRingQueue::new(5).ring_size(), 8);
        assert_eq!(LinkedRingQueue::new(8).ring_size(), 8);
        assert_eq!(LinkedRingQueue::new(0).ring_size(), 1);
    }

    #[test]
    fn test_ring_size_capped() {
        assert_eq!(LinkedRingQueue::new(MAX_RING_SIZE + 1).ring_size(), MAX_RING_SIZE);
        assert_eq!(LinkedRingQueue::new(usize::MAX).ring_size(), MAX_RING_SIZE);
    }

    #[test]
    fn test_fifo_across_segments() {
        let queue = LinkedRingQueue::new(4);
        let mut ids = Vec::new();
        for _ in 0..11 {
            let j = job();
            ids.push(j.id());
            queue.push(j);
        }
        assert_eq!(queue.segment_count(), 3);
        assert_eq!(queue.len(), 11);

        assert_eq!(drain(&queue), ids);
        assert!(queue.is_empty());
        assert_eq!(queue.segment_count(), 1);
    }

    #[test]
    fn test_wraps_within_one_segment() {
        let queue = LinkedRingQueue::new(4);
        for _ in 0..3 {
            for _ in 0..3 {
                queue.push(job());
            }
            assert_eq!(drain(&queue).len(), 3);
        }
        assert_eq!(queue.segment_count(), 1);
    }

    #[test]
    fn test_overflow_then_two_bulk_pops() {
        let queue = LinkedRingQueue::new(4);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let j = job();
            ids.push(j.id());
            queue.push(j);
        }
        assert_eq!(queue.segment_count(), 2);

        let first = queue.bulk_pop();
        let second = queue.bulk_pop();
        assert!(queue.is_empty());

        let mut popped = drain(first.as_ref());
        assert_eq!(popped.len(), 4);
        popped.extend(drain(second.as_ref()));
        assert_eq!(popped, ids);
    }

    #[test]
    fn test_bulk_pop_replaces_last_segment() {
        let queue = LinkedRingQueue::new(2);
        queue.push(job());

        let batch = queue.bulk_pop();
        assert!(batch.pop().is_some());
        assert_eq!(queue.segment_count(), 1);

        queue.push(job());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_bulk_pop_on_empty_queue() {
        let queue = LinkedRingQueue::new(4);
        assert!(queue.bulk_pop().is_empty());
        assert_eq!(queue.segment_count(), 1);
    }
}
