//! Lock plus condition variable shared by queue decorators and workers

use super::JobQueue;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A mutex-protected value with a condition variable for sleep and wake.
///
/// Waiters re-check their condition while holding the lock immediately
/// before sleeping, and wakers signal while holding the same lock, so a push
/// that lands between the check and the sleep is never missed. Once
/// [`close`](Monitor::close)d, every sleeper is released and later waits
/// return at once.
pub struct Monitor<T> {
    state: Mutex<T>,
    condvar: Condvar,
    closed: AtomicBool,
}

impl<T> Monitor<T> {
    /// Wrap `state` in a new monitor
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            condvar: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Acquire the lock
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock()
    }

    /// Sleep on a held guard for at most `timeout`.
    ///
    /// Returns `true` if woken before the timeout elapsed.
    pub fn sleep(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> bool {
        !self.condvar.wait_for(guard, timeout).timed_out()
    }

    /// Wake every thread sleeping on this monitor
    pub fn wake_all(&self) {
        let _guard = self.state.lock();
        self.condvar.notify_all();
    }

    /// Release every sleeper and make future waits return immediately.
    pub fn close(&self) {
        let _guard = self.state.lock();
        self.closed.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    /// Whether [`close`](Monitor::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T: JobQueue> Monitor<T> {
    /// Sleep until the guarded queue has contents, the monitor is closed, a
    /// wake-up arrives or `timeout` elapses.
    ///
    /// Returns `true` if the queue had contents when the call returned.
    pub fn await_contents(&self, timeout: Duration) -> bool {
        let mut guard = self.state.lock();
        if guard.has_contents() {
            return true;
        }
        if self.is_closed() {
            return false;
        }

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::worker_sleep();

        self.sleep(&mut guard, timeout);
        guard.has_contents()
    }
}

impl<T> fmt::Debug for Monitor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("closed", &self.is_closed())
            .finish()
    }
}
