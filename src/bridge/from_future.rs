//! Futures driven as promises.
//!
//! [`Promise::from_future`] polls the future itself instead of handing it to
//! an executor. The first poll happens inline while the promise is being
//! built; every later poll happens on the thread that wakes the future. A
//! small state machine guarantees that at most one thread polls at a time
//! and that a wake arriving mid-poll triggers another poll instead of being
//! lost:
//!
//! ```text
//! Idle ──wake──► Polling ──Pending──► Idle
//!                  │  ▲
//!            wake  │  │ Pending
//!                  ▼  │
//!                 Repoll
//! (any) ──Ready / cancel──► Done
//! ```
//!
//! Cancelling the promise drops the future, which is how cooperative
//! cancellation reaches the async code.

use crate::core::Outcome;
use crate::error::PanicError;
use crate::promise::{Promise, Resolver};
use crate::tracing_compat::{debug, warn};
use crate::types::ChildCancelMode;
use futures_lite::FutureExt;
use futures_lite::future::Boxed;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll, Wake, Waker};

const IDLE: u8 = 0;
const POLLING: u8 = 1;
const REPOLL: u8 = 2;
const DONE: u8 = 3;

type Guarded<T> = Boxed<std::thread::Result<Outcome<T>>>;

struct FutureDriver<T> {
    future: Mutex<Option<Guarded<T>>>,
    state: AtomicU8,
    resolver: Resolver<T>,
}

impl<T: Clone + Send + 'static> FutureDriver<T> {
    /// Polls the future unless another thread already is.
    fn schedule(self: &Arc<Self>) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let next = match current {
                IDLE => POLLING,
                POLLING => REPOLL,
                _ => return,
            };
            match self
                .state
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) if next == POLLING => break,
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
        self.drive();
    }

    fn drive(self: &Arc<Self>) {
        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);
        loop {
            let polled = {
                let mut slot = self.future.lock();
                let Some(future) = slot.as_mut() else {
                    self.state.store(DONE, Ordering::Release);
                    return;
                };
                let polled = future.as_mut().poll(&mut cx);
                if polled.is_ready() {
                    *slot = None;
                }
                polled
            };
            match polled {
                Poll::Ready(result) => {
                    self.state.store(DONE, Ordering::Release);
                    self.complete(result);
                    return;
                }
                Poll::Pending => {
                    if self.transition(POLLING, IDLE) {
                        return;
                    }
                    if !self.transition(REPOLL, POLLING) {
                        // Abandoned while polling.
                        let abandoned = self.future.lock().take();
                        drop(abandoned);
                        return;
                    }
                }
            }
        }
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn complete(&self, result: std::thread::Result<Outcome<T>>) {
        let outcome = result.unwrap_or_else(|payload| {
            let error = PanicError::from_payload(payload.as_ref());
            warn!(promise = %self.resolver.id(), panic = %error.message(), "future panicked; rejecting");
            Err(error.into())
        });
        self.resolver.settle(outcome);
    }

    /// Drops the future after the promise was cancelled.
    fn abandon(&self) {
        if self.state.swap(DONE, Ordering::AcqRel) == DONE {
            return;
        }
        // A poll in progress holds the lock; it drops the future itself.
        let abandoned = self.future.try_lock().and_then(|mut slot| slot.take());
        if abandoned.is_some() {
            debug!(promise = %self.resolver.id(), "promise cancelled; future dropped");
        }
    }
}

impl<T: Clone + Send + 'static> Wake for FutureDriver<T> {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Drives `future` to completion and settles with its output.
    ///
    /// A future that is ready on its first poll completes the promise
    /// synchronously. `Err(PromiseError::Cancelled(..))` cancels the
    /// promise; a panic rejects with
    /// [`PromiseError::Panicked`](crate::PromiseError::Panicked).
    /// Cancelling the promise drops the future. Uses
    /// [`ChildCancelMode::All`].
    ///
    /// # Example
    ///
    /// ```
    /// use pledge::{Promise, PromiseError};
    ///
    /// let promise = Promise::from_future(async { Ok::<_, PromiseError>(7) });
    /// assert!(promise.completed_synchronously());
    /// assert_eq!(promise.wait().unwrap(), 7);
    /// ```
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self::from_future_with_mode(ChildCancelMode::All, future)
    }

    /// Like [`from_future`](Self::from_future), with an explicit mode.
    pub fn from_future_with_mode<F>(mode: ChildCancelMode, future: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self::with_mode(mode, move |resolver, on_cancel| {
            let driver = Arc::new(FutureDriver {
                future: Mutex::new(Some(AssertUnwindSafe(future).catch_unwind().boxed())),
                state: AtomicU8::new(IDLE),
                resolver,
            });
            let weak = Arc::downgrade(&driver);
            on_cancel.register(move || {
                if let Some(driver) = weak.upgrade() {
                    driver.abandon();
                }
            });
            driver.schedule();
        })
    }
}
