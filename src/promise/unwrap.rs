//! Handlers that return promises.
//!
//! The child of an unwrapping handler *adopts* the promise the handler
//! returns: it settles with the inner promise's outcome and sync flag.
//! Cancelling the child cancels its parent (under the tree rules) and, once a
//! promise has been adopted, the adopted promise too. An inner promise that
//! arrives after the child was cancelled is cancelled on arrival.

use super::{Promise, WeakPromise, capture};
use crate::core::Outcome;
use crate::error::PromiseError;
use crate::tracing_compat::warn;
use crate::types::CancelReason;
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// What an unwrapping reaction decided.
pub(crate) enum Step<R> {
    /// Settle the child directly.
    Settle(Outcome<R>),
    /// Settle the child with this promise's outcome.
    Adopt(Promise<R>),
}

enum Slot<R> {
    Waiting,
    Adopted(WeakPromise<R>),
    Cancelled,
}

/// Links an unwrap child to the promise it adopted.
struct Adoption<R> {
    slot: Mutex<Slot<R>>,
}

impl<R: Clone + Send + 'static> Adoption<R> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Waiting),
        }
    }

    /// Records `inner`. Returns false (and cancels `inner`) if the child was
    /// cancelled first.
    fn adopt(&self, inner: &Promise<R>) -> bool {
        let mut slot = self.slot.lock();
        match *slot {
            Slot::Waiting => {
                *slot = Slot::Adopted(inner.downgrade());
                true
            }
            Slot::Cancelled | Slot::Adopted(_) => {
                drop(slot);
                inner.cancel_with(CancelReason::children_cancelled());
                false
            }
        }
    }

    fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Cancelled);
        let adopted = match previous {
            Slot::Adopted(inner) => inner.upgrade(),
            Slot::Waiting | Slot::Cancelled => None,
        };
        if let Some(inner) = adopted {
            inner.cancel_with(CancelReason::children_cancelled());
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Derives a child that may adopt a promise produced by `react`.
    pub(crate) fn derive_unwrap<R, F>(&self, always: bool, react: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(&Outcome<T>) -> Step<R> + Send + 'static,
    {
        let child = self.create_child::<R>();
        let adoption = Arc::new(Adoption::<R>::new());
        let on_cancel = Arc::clone(&adoption);
        child.register_on_cancel(move || on_cancel.cancel());

        let target = child.clone();
        self.subscribe(move |outcome, synchronous| {
            if !always && !target.is_pending() {
                return;
            }
            match react(outcome) {
                Step::Settle(next) => {
                    target.settle(next, synchronous);
                }
                Step::Adopt(inner) => {
                    if adoption.adopt(&inner) {
                        inner.subscribe(move |inner_outcome, inner_synchronous| {
                            target.settle(inner_outcome.clone(), inner_synchronous);
                        });
                    }
                }
            }
        });
        child
    }

    /// Chains a handler that returns a promise and adopts it.
    ///
    /// Rejections (including cancellation) pass through without calling `f`.
    pub fn and_then<R, F>(&self, f: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<R> + Send + 'static,
    {
        self.derive_unwrap(false, move |outcome| match outcome {
            Ok(value) => {
                let value = value.clone();
                match capture(move || Ok(f(value))) {
                    Ok(inner) => Step::Adopt(inner),
                    Err(error) => Step::Settle(Err(error)),
                }
            }
            Err(error) => Step::Settle(Err(error.clone())),
        })
    }

    /// Recovers from a rejection with a promise.
    ///
    /// Fulfillment and cancellation pass through without calling `f`.
    pub fn or_else<F>(&self, f: F) -> Self
    where
        F: FnOnce(PromiseError) -> Self + Send + 'static,
    {
        self.derive_unwrap(false, move |outcome| match outcome {
            Err(error) if !error.is_cancelled() => {
                let error = error.clone();
                match capture(move || Ok(f(error))) {
                    Ok(inner) => Step::Adopt(inner),
                    Err(error) => Step::Settle(Err(error)),
                }
            }
            other => Step::Settle(other.clone()),
        })
    }

    /// Runs an asynchronous cleanup on every outcome and waits for it.
    ///
    /// The child settles with the parent's outcome once the cleanup promise
    /// fulfills, or rejects with the cleanup's error.
    pub fn finally_with<U, F>(&self, f: F) -> Self
    where
        U: Clone + Send + 'static,
        F: FnOnce() -> Promise<U> + Send + 'static,
    {
        self.derive_unwrap(true, move |outcome| {
            let original = outcome.clone();
            match capture(move || Ok(f())) {
                Ok(cleanup) => Step::Adopt(cleanup.derive(move |cleanup_outcome| {
                    match cleanup_outcome {
                        Ok(_) => original,
                        Err(error) => Err(error.clone()),
                    }
                })),
                Err(error) => Step::Settle(Err(error)),
            }
        })
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Observes the value with an asynchronous side effect.
    ///
    /// The child waits for the promise `f` returns, then fulfills with the
    /// original value whatever that promise settled with. A panic in `f` is
    /// logged and the value passes through at once. Rejections (including
    /// cancellation) pass through without calling `f`.
    pub fn tap_with<U, F>(&self, f: F) -> Self
    where
        U: Clone + Send + 'static,
        F: FnOnce(&T) -> Promise<U> + Send + 'static,
    {
        self.derive_unwrap(false, move |outcome| {
            let Ok(value) = outcome else {
                return Step::Settle(outcome.clone());
            };
            match catch_unwind(AssertUnwindSafe(|| f(value))) {
                Ok(tapped) => Step::Adopt(passthrough_after(&tapped, outcome.clone())),
                Err(_) => {
                    warn!("tap_with handler panicked; ignoring");
                    Step::Settle(outcome.clone())
                }
            }
        })
    }

    /// Observes a rejection with an asynchronous side effect.
    ///
    /// The child waits for the promise `f` returns, then rejects with the
    /// original error. Fulfillment and cancellation pass through without
    /// calling `f`. A panic in `f` is logged and swallowed.
    pub fn tap_catch_with<U, F>(&self, f: F) -> Self
    where
        U: Clone + Send + 'static,
        F: FnOnce(&PromiseError) -> Promise<U> + Send + 'static,
    {
        self.derive_unwrap(false, move |outcome| match outcome {
            Err(error) if !error.is_cancelled() => {
                match catch_unwind(AssertUnwindSafe(|| f(error))) {
                    Ok(tapped) => Step::Adopt(passthrough_after(&tapped, outcome.clone())),
                    Err(_) => {
                        warn!("tap_catch_with handler panicked; ignoring");
                        Step::Settle(outcome.clone())
                    }
                }
            }
            other => Step::Settle(other.clone()),
        })
    }
}

/// Settles with `original` once `tapped` settles, however it settles.
fn passthrough_after<T, U>(tapped: &Promise<U>, original: Outcome<T>) -> Promise<T>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    tapped.derive(move |_| original)
}

impl<R: Clone + Send + 'static> Promise<Promise<R>> {
    /// Flattens a promise of a promise.
    pub fn flatten(&self) -> Promise<R> {
        self.derive_unwrap(false, |outcome| match outcome {
            Ok(inner) => Step::Adopt(inner.clone()),
            Err(error) => Step::Settle(Err(error.clone())),
        })
    }
}
