//! Promises as futures.

use crate::core::Outcome;
use crate::promise::Promise;
use crate::types::PromiseState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Status of a [`Task`], mirroring the promise state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// The promise has not settled.
    Pending,
    /// The promise fulfilled.
    Completed,
    /// The promise rejected.
    Faulted,
    /// The promise was cancelled.
    Cancelled,
}

impl From<PromiseState> for TaskStatus {
    fn from(state: PromiseState) -> Self {
        match state {
            PromiseState::Pending => Self::Pending,
            PromiseState::Fulfilled => Self::Completed,
            PromiseState::Rejected => Self::Faulted,
            PromiseState::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Completed => f.write_str("completed"),
            Self::Faulted => f.write_str("faulted"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A promise viewed as a [`Future`].
///
/// Resolves to the promise's outcome. Observing a promise through a task
/// does not make the task a child: dropping or awaiting the task never
/// affects the promise's cancellation tree. Use [`Task::cancel`] to cancel
/// the underlying promise explicitly.
///
/// # Example
///
/// ```
/// use pledge::Promise;
///
/// let task = Promise::resolved(3).map(|v| v + 1).to_task();
/// let value = futures_lite::future::block_on(task).unwrap();
/// assert_eq!(value, 4);
/// ```
pub struct Task<T> {
    promise: Promise<T>,
    waker: Arc<Mutex<Option<Waker>>>,
}

impl<T: Clone + Send + 'static> Task<T> {
    pub(crate) fn new(promise: Promise<T>) -> Self {
        let waker: Arc<Mutex<Option<Waker>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&waker);
        promise.subscribe(move |_, _| {
            let waker = slot.lock().take();
            if let Some(waker) = waker {
                waker.wake();
            }
        });
        Self { promise, waker }
    }

    /// Returns the status of the underlying promise.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.promise.state().into()
    }

    /// Returns true once the underlying promise has settled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status() != TaskStatus::Pending
    }

    /// Cancels the underlying promise.
    pub fn cancel(&self) -> bool {
        self.promise.cancel()
    }

    /// Returns the underlying promise.
    #[must_use]
    pub fn promise(&self) -> &Promise<T> {
        &self.promise
    }

    /// Converts the task back into its promise.
    #[must_use]
    pub fn into_promise(self) -> Promise<T> {
        self.promise
    }
}

impl<T: Clone + Send + 'static> Future for Task<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.promise.try_result() {
            return Poll::Ready(outcome);
        }
        {
            let mut slot = self.waker.lock();
            match slot.as_mut() {
                Some(existing) if existing.will_wake(cx.waker()) => {}
                _ => *slot = Some(cx.waker().clone()),
            }
        }
        // The completion may have drained the slot before the waker landed.
        match self.promise.try_result() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("promise", &self.promise.id())
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Views this promise as a future.
    pub fn to_task(&self) -> Task<T> {
        Task::new(self.clone())
    }

    /// Returns the promise a task was created from.
    ///
    /// The state mapping is preserved: a completed task gives a fulfilled
    /// promise, a faulted one a rejected promise, a cancelled one a
    /// cancelled promise.
    pub fn from_task(task: Task<T>) -> Self {
        task.into_promise()
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Promise<T> {
    type Output = Outcome<T>;
    type IntoFuture = Task<T>;

    fn into_future(self) -> Self::IntoFuture {
        Task::new(self)
    }
}
