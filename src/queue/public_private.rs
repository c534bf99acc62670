//! Public/private queue union

use super::{BoxedQueue, JobQueue, QueueCapabilities};
use crate::core::job::ScheduledJob;

/// Serves a private queue before falling back to a public one.
///
/// A worker feeds its own private queue without synchronization; external
/// pushes go to the public queue. `pop` and `bulk_pop` only touch the
/// public queue when the private one is empty.
#[derive(Debug)]
pub struct PublicPrivateQueue<P, Q> {
    public: P,
    private: Q,
}

impl<P: JobQueue, Q: JobQueue> PublicPrivateQueue<P, Q> {
    /// Combine a public and a private queue
    pub fn new(public: P, private: Q) -> Self {
        Self { public, private }
    }

    /// The shared queue that external pushes land on
    pub fn public(&self) -> &P {
        &self.public
    }

    /// The queue served first
    pub fn private(&self) -> &Q {
        &self.private
    }
}

impl<P: JobQueue, Q: JobQueue> JobQueue for PublicPrivateQueue<P, Q> {
    fn capabilities(&self) -> QueueCapabilities {
        let public = self.public.capabilities();
        let private = self.private.capabilities();
        QueueCapabilities {
            maintains_order: public.maintains_order && private.maintains_order,
            thread_safe: public.thread_safe,
            lock_free: public.lock_free && private.lock_free,
            partial_bulk_pop: true,
            blocking: public.blocking,
            notifying: public.notifying,
            implementation_name: "PublicPrivateQueue",
        }
    }

    fn is_empty(&self) -> bool {
        self.private.is_empty() && self.public.is_empty()
    }

    fn push(&self, job: ScheduledJob) {
        self.public.push(job);
    }

    fn pop(&self) -> Option<ScheduledJob> {
        self.private.pop().or_else(|| self.public.pop())
    }

    fn bulk_pop(&self) -> BoxedQueue {
        let batch = self.private.bulk_pop();
        if batch.has_contents() {
            return batch;
        }
        self.public.bulk_pop()
    }
}
