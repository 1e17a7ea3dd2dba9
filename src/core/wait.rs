//! Lazily allocated blocking primitive.
//!
//! A [`WaitHandle`] is a one-shot latch: once [`set`](WaitHandle::set) it stays
//! set and every current and future waiter returns immediately. The
//! completion core only allocates one when a thread actually blocks.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// One-shot latch used to block threads until a promise settles.
#[derive(Debug, Default)]
pub struct WaitHandle {
    set: Mutex<bool>,
    condvar: Condvar,
}

impl WaitHandle {
    /// Creates an unset handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latch and wakes every waiter.
    pub fn set(&self) {
        let mut set = self.set.lock();
        if !*set {
            *set = true;
            self.condvar.notify_all();
        }
    }

    /// Returns true once the latch has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Blocks until the latch is set.
    pub fn wait(&self) {
        let mut set = self.set.lock();
        while !*set {
            self.condvar.wait(&mut set);
        }
    }

    /// Blocks until the latch is set or `timeout` elapses.
    ///
    /// Returns whether the latch was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut set = self.set.lock();
        while !*set {
            if self.condvar.wait_until(&mut set, deadline).timed_out() {
                return *set;
            }
        }
        true
    }
}
