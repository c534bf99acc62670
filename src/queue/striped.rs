//! Striped composite queue

use super::{BoxedQueue, JobQueue, ListQueue, QueueCapabilities, SharedQueue};
use crate::core::error::{Result, SchedulerError};
use crate::core::job::ScheduledJob;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How a hash or cursor is reduced to a stripe index
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StripeIndex {
    /// Power-of-two stripe counts reduce with a bitmask
    Mask(usize),
    Modulo(usize),
}

impl StripeIndex {
    fn for_count(count: usize) -> Self {
        if count.is_power_of_two() {
            StripeIndex::Mask(count - 1)
        } else {
            StripeIndex::Modulo(count)
        }
    }

    fn reduce(self, value: usize) -> usize {
        match self {
            StripeIndex::Mask(mask) => value & mask,
            StripeIndex::Modulo(count) => value % count,
        }
    }
}

/// Spreads jobs over independent sub-queues to cut lock contention.
///
/// Push selects a stripe from the job's identity hash. Pop and `bulk_pop`
/// scan every stripe starting from a rotating cursor so no stripe is
/// always favoured. Ordering across stripes is not preserved.
pub struct StripedQueue {
    stripes: Vec<SharedQueue>,
    index: StripeIndex,
    cursor: AtomicUsize,
}

impl StripedQueue {
    /// Combine `stripes` into one logical queue.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if `stripes` is empty.
    pub fn new(stripes: Vec<SharedQueue>) -> Result<Self> {
        if stripes.is_empty() {
            return Err(SchedulerError::invalid_config(
                "stripes",
                "a striped queue needs at least one stripe",
            ));
        }
        let index = StripeIndex::for_count(stripes.len());
        Ok(Self {
            stripes,
            index,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Build `count` stripes with `make_stripe`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if `count` is zero.
    pub fn with_stripes<F>(count: usize, make_stripe: F) -> Result<Self>
    where
        F: FnMut() -> SharedQueue,
    {
        let mut make_stripe = make_stripe;
        Self::new((0..count).map(|_| make_stripe()).collect())
    }

    /// Number of stripes
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// The stripe at `index`
    pub fn stripe(&self, index: usize) -> Option<&SharedQueue> {
        self.stripes.get(index)
    }

    /// Index of the stripe `job` would be pushed onto
    pub fn stripe_for(&self, job: &ScheduledJob) -> usize {
        self.index.reduce(job.stripe_hash())
    }

    fn scan_order(&self) -> impl Iterator<Item = &SharedQueue> + '_ {
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        (0..self.stripes.len()).map(move |offset| {
            &self.stripes[self.index.reduce(start.wrapping_add(offset))]
        })
    }
}

impl fmt::Debug for StripedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripedQueue")
            .field("stripes", &self.stripes.len())
            .field("index", &self.index)
            .finish()
    }
}

impl JobQueue for StripedQueue {
    fn capabilities(&self) -> QueueCapabilities {
        let all = |check: fn(&QueueCapabilities) -> bool| {
            self.stripes.iter().all(|s| check(&s.capabilities()))
        };
        QueueCapabilities {
            maintains_order: false,
            thread_safe: all(|c| c.thread_safe),
            lock_free: all(|c| c.lock_free),
            partial_bulk_pop: true,
            blocking: false,
            notifying: all(|c| c.notifying),
            implementation_name: "StripedQueue",
        }
    }

    fn is_empty(&self) -> bool {
        self.stripes.iter().all(|s| s.is_empty())
    }

    fn push(&self, job: ScheduledJob) {
        let stripe = self.stripe_for(&job);
        self.stripes[stripe].push(job);
    }

    fn pop(&self) -> Option<ScheduledJob> {
        self.scan_order().find_map(|stripe| stripe.pop())
    }

    fn bulk_pop(&self) -> BoxedQueue {
        for stripe in self.scan_order() {
            let batch = stripe.bulk_pop();
            if batch.has_contents() {
                return batch;
            }
        }
        Box::new(ListQueue::new())
    }
}
