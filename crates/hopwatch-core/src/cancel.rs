use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cooperative cancellation signal.
///
/// Cheaply cloneable; all clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake all waiters.
    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.condvar.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Sleep for `timeout` or until cancelled.
    ///
    /// Returns `true` if cancelled.
    ///
    /// A timeout too large to represent as a deadline waits until cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            match deadline {
                Some(deadline) => {
                    if self
                        .inner
                        .condvar
                        .wait_until(&mut cancelled, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                None => self.inner.condvar.wait(&mut cancelled),
            }
        }
        *cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out() {
        let cancel = Cancellation::new();
        let start = Instant::now();
        assert!(!cancel.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let cancel = Cancellation::new();
        let waiter = cancel.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        assert!(handle.join().unwrap());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_unbounded_wait_woken_by_cancel() {
        let cancel = Cancellation::new();
        let waiter = cancel.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::MAX));
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_already_cancelled_returns_immediately() {
        let cancel = Cancellation::new();
        cancel.cancel();
        let start = Instant::now();
        assert!(cancel.wait_timeout(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
