//! Queue decorators adding synchronization, wake-on-push and blocking pops
//!
//! The decorators compose: the scheduler's shared queues are
//! `NotifyAllQueue<SynchronizedQueue<ListQueue>, ListQueue>`, all sharing one
//! [`Monitor`], and workers read them through a [`BlockingQueue`] on the same
//! monitor.

use super::{BoxedQueue, JobQueue, Monitor, QueueCapabilities};
use crate::core::job::ScheduledJob;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Serializes every operation on the wrapped queue through one lock.
pub struct SynchronizedQueue<Q> {
    monitor: Arc<Monitor<Q>>,
}

impl<Q: JobQueue> SynchronizedQueue<Q> {
    /// Wrap `queue` behind a new monitor
    pub fn new(queue: Q) -> Self {
        Self::with_monitor(Arc::new(Monitor::new(queue)))
    }

    /// Use an existing monitor, shared with other decorators
    pub fn with_monitor(monitor: Arc<Monitor<Q>>) -> Self {
        Self { monitor }
    }

    /// The monitor guarding the wrapped queue
    pub fn monitor(&self) -> &Arc<Monitor<Q>> {
        &self.monitor
    }
}

impl<Q> fmt::Debug for SynchronizedQueue<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizedQueue")
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl<Q: JobQueue> JobQueue for SynchronizedQueue<Q> {
    fn capabilities(&self) -> QueueCapabilities {
        let inner = self.monitor.lock().capabilities();
        QueueCapabilities {
            thread_safe: true,
            lock_free: false,
            implementation_name: "SynchronizedQueue",
            ..inner
        }
    }

    fn is_empty(&self) -> bool {
        self.monitor.lock().is_empty()
    }

    fn push(&self, job: ScheduledJob) {
        self.monitor.lock().push(job);
    }

    fn pop(&self) -> Option<ScheduledJob> {
        self.monitor.lock().pop()
    }

    fn bulk_pop(&self) -> BoxedQueue {
        self.monitor.lock().bulk_pop()
    }
}

/// Wakes every sleeper on a monitor after each push.
pub struct NotifyAllQueue<Q, T> {
    inner: Q,
    monitor: Arc<Monitor<T>>,
}

impl<Q: JobQueue, T> NotifyAllQueue<Q, T> {
    /// Decorate `inner`, signalling `monitor` on push
    pub fn new(inner: Q, monitor: Arc<Monitor<T>>) -> Self {
        Self { inner, monitor }
    }

    /// The decorated queue
    pub fn inner(&self) -> &Q {
        &self.inner
    }
}

impl<Q, T> fmt::Debug for NotifyAllQueue<Q, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyAllQueue")
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl<Q: JobQueue, T> JobQueue for NotifyAllQueue<Q, T> {
    fn capabilities(&self) -> QueueCapabilities {
        QueueCapabilities {
            notifying: true,
            ..self.inner.capabilities()
        }
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn push(&self, job: ScheduledJob) {
        self.inner.push(job);
        self.monitor.wake_all();
    }

    fn pop(&self) -> Option<ScheduledJob> {
        self.inner.pop()
    }

    fn bulk_pop(&self) -> BoxedQueue {
        self.inner.bulk_pop()
    }
}

/// Makes `pop` and `bulk_pop` sleep on a monitor when nothing is found.
///
/// An empty first attempt sleeps until the monitor's queue has contents, a
/// wake-up arrives, the monitor is closed or `timeout` elapses, then retries
/// exactly once. The emptiness re-check and the sleep happen under the
/// monitor's lock, which the decorator takes itself.
pub struct BlockingQueue<Q, T> {
    inner: Q,
    monitor: Arc<Monitor<T>>,
    timeout: Duration,
}

impl<Q: JobQueue, T: JobQueue> BlockingQueue<Q, T> {
    /// Decorate `inner`, sleeping on `monitor` for at most `timeout`
    pub fn new(inner: Q, monitor: Arc<Monitor<T>>, timeout: Duration) -> Self {
        Self {
            inner,
            monitor,
            timeout,
        }
    }

    /// The decorated queue
    pub fn inner(&self) -> &Q {
        &self.inner
    }

    /// The monitor slept on
    pub fn monitor(&self) -> &Arc<Monitor<T>> {
        &self.monitor
    }
}

impl<Q, T> fmt::Debug for BlockingQueue<Q, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingQueue")
            .field("monitor", &self.monitor)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<Q: JobQueue, T: JobQueue> JobQueue for BlockingQueue<Q, T> {
    fn capabilities(&self) -> QueueCapabilities {
        QueueCapabilities {
            blocking: true,
            ..self.inner.capabilities()
        }
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn push(&self, job: ScheduledJob) {
        self.inner.push(job);
    }

    fn pop(&self) -> Option<ScheduledJob> {
        if let Some(job) = self.inner.pop() {
            return Some(job);
        }
        self.monitor.await_contents(self.timeout);
        self.inner.pop()
    }

    fn bulk_pop(&self) -> BoxedQueue {
        let batch = self.inner.bulk_pop();
        if batch.has_contents() {
            return batch;
        }
        self.monitor.await_contents(self.timeout);
        self.inner.bulk_pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::ClosureJob;
    use crate::queue::{ListQueue, SharedQueue};
    use crate::scheduler::JobContext;
    use std::thread;
    use std::time::Instant;

    fn job() -> ScheduledJob {
        ScheduledJob::new(ClosureJob::new(|_ctx: &JobContext| Ok(()))).0
    }

    fn monitored() -> (Arc<Monitor<ListQueue>>, NotifyAllQueue<SynchronizedQueue<ListQueue>, ListQueue>) {
        let monitor = Arc::new(Monitor::new(ListQueue::new()));
        let queue = NotifyAllQueue::new(
            SynchronizedQueue::with_monitor(Arc::clone(&monitor)),
            Arc::clone(&monitor),
        );
        (monitor, queue)
    }

    #[test]
    fn test_synchronized_capabilities() {
        let queue = SynchronizedQueue::new(ListQueue::new());
        assert!(queue.is_thread_safe());
        assert!(queue.maintains_order());

        let (_, notifying) = monitored();
        let caps = notifying.capabilities();
        assert!(caps.thread_safe);
        assert!(caps.notifying);
        assert!(!caps.blocking);
    }

    #[test]
    fn test_synchronized_shared_between_threads() {
        let queue: SharedQueue = Arc::new(SynchronizedQueue::new(ListQueue::new()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for _ in 0..250 {
                        queue.push(job());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("producer panicked");
        }

        let mut count = 0;
        while queue.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 1000);
    }

    #[test]
    fn test_blocking_pop_wakes_on_push() {
        let (monitor, queue) = monitored();
        let queue = Arc::new(queue);
        let producer = Arc::clone(&queue);

        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            producer.push(job());
        });

        let blocking = BlockingQueue::new(Arc::clone(&queue), monitor, Duration::from_secs(10));
        let start = Instant::now();
        let mut popped = None;
        while popped.is_none() && start.elapsed() < Duration::from_secs(5) {
            popped = blocking.pop();
        }
        assert!(popped.is_some());
        assert!(start.elapsed() < Duration::from_secs(5));
        t.join().expect("producer panicked");
    }

    #[test]
    fn test_blocking_bulk_pop_gives_up_after_timeout() {
        let (monitor, queue) = monitored();
        let blocking = BlockingQueue::new(queue, monitor, Duration::from_millis(20));

        let start = Instant::now();
        assert!(blocking.bulk_pop().is_empty());
        assert!(start.elapsed() >= Duration::from_millis(15));
        assert!(blocking.capabilities().blocking);
    }

    #[test]
    fn test_blocking_returns_when_closed() {
        let (monitor, queue) = monitored();
        monitor.close();
        let blocking = BlockingQueue::new(queue, monitor, Duration::from_secs(30));

        let start = Instant::now();
        assert!(blocking.pop().is_none());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
