//! Ordered single-threaded queue

use super::{BoxedQueue, JobQueue, QueueCapabilities};
use crate::core::job::ScheduledJob;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem;

/// FIFO queue for use by a single thread.
///
/// `bulk_pop` moves the whole backing buffer out in O(1) and leaves an empty
/// one in its place. Wrap in a [`SynchronizedQueue`](super::SynchronizedQueue)
/// to share between threads.
#[derive(Default)]
pub struct ListQueue {
    jobs: RefCell<VecDeque<ScheduledJob>>,
}

impl ListQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued jobs
    pub fn len(&self) -> usize {
        self.jobs.borrow().len()
    }

    pub(crate) fn from_jobs(jobs: VecDeque<ScheduledJob>) -> Self {
        Self {
            jobs: RefCell::new(jobs),
        }
    }
}

impl fmt::Debug for ListQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListQueue").field("len", &self.len()).finish()
    }
}

impl JobQueue for ListQueue {
    fn capabilities(&self) -> QueueCapabilities {
        QueueCapabilities::ordered_local("ListQueue")
    }

    fn is_empty(&self) -> bool {
        self.jobs.borrow().is_empty()
    }

    fn push(&self, job: ScheduledJob) {
        self.jobs.borrow_mut().push_back(job);
    }

    fn pop(&self) -> Option<ScheduledJob> {
        self.jobs.borrow_mut().pop_front()
    }

    fn bulk_pop(&self) -> BoxedQueue {
        let jobs = mem::take(&mut *self.jobs.borrow_mut());
        Box::new(ListQueue::from_jobs(jobs))
    }
}

impl Iterator for ListQueue {
    type Item = ScheduledJob;

    fn next(&mut self) -> Option<ScheduledJob> {
        self.jobs.get_mut().pop_front()
    }
}
