//! Value and error handlers.
//!
//! Every method here derives a child promise (see the cancellation tree rules
//! on [`Promise`]). Handlers run on the thread that settles the parent, or
//! immediately on the calling thread when the parent is already settled; the
//! child inherits the parent's sync flag either way.
//!
//! A handler that returns `Err` or panics rejects the child. Nothing escapes
//! to the thread that settled the parent.
//!
//! Cancellation is never handed to a reject handler. It flows through
//! `catch`, `catch_as`, `recover`, `tap_catch` and the error arm of
//! `then_or_else` untouched, and always reaches `finally`.

use super::owner::OwnerScope;
use super::{Promise, Resolver, capture};
use crate::core::Outcome;
use crate::error::PromiseError;
use crate::tracing_compat::warn;
use std::error::Error as StdError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// The verdict of a [`Promise::recover`] handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery<T> {
    /// The error was handled; fulfill with this value.
    Handled(T),
    /// The error is not handled here; reject with the original error.
    Unhandled,
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Derives a child settled by `react`.
    ///
    /// `react` is skipped when the child was cancelled before the parent
    /// settled.
    pub(crate) fn derive<R, F>(&self, react: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(&Outcome<T>) -> Outcome<R> + Send + 'static,
    {
        self.derive_inner(false, react)
    }

    fn derive_inner<R, F>(&self, always: bool, react: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(&Outcome<T>) -> Outcome<R> + Send + 'static,
    {
        let child = self.create_child::<R>();
        let target = child.clone();
        self.subscribe(move |outcome, synchronous| {
            if always || target.is_pending() {
                let next = react(outcome);
                target.settle(next, synchronous);
            }
        });
        child
    }

    /// Transforms the value with a fallible handler.
    ///
    /// Rejections (including cancellation) pass through.
    pub fn then<R, E, F>(&self, on_fulfilled: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        E: Into<PromiseError>,
        F: FnOnce(T) -> Result<R, E> + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Ok(value) => {
                let value = value.clone();
                capture(move || on_fulfilled(value).map_err(Into::into))
            }
            Err(error) => Err(error.clone()),
        })
    }

    /// Transforms the value with an infallible handler.
    pub fn map<R, F>(&self, f: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Ok(value) => {
                let value = value.clone();
                capture(move || Ok(f(value)))
            }
            Err(error) => Err(error.clone()),
        })
    }

    /// Handles both fulfillment and rejection.
    ///
    /// Cancellation bypasses `on_rejected`.
    pub fn then_or_else<R, E, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<R>
    where
        R: Clone + Send + 'static,
        E: Into<PromiseError>,
        F: FnOnce(T) -> Result<R, E> + Send + 'static,
        G: FnOnce(PromiseError) -> Result<R, E> + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Ok(value) => {
                let value = value.clone();
                capture(move || on_fulfilled(value).map_err(Into::into))
            }
            Err(error) if error.is_cancelled() => Err(error.clone()),
            Err(error) => {
                let error = error.clone();
                capture(move || on_rejected(error).map_err(Into::into))
            }
        })
    }

    /// Recovers from a rejection.
    ///
    /// The handler's `Ok` fulfills the child, its `Err` rejects it.
    /// Fulfillment and cancellation pass through.
    pub fn catch<E, F>(&self, on_rejected: F) -> Self
    where
        E: Into<PromiseError>,
        F: FnOnce(PromiseError) -> Result<T, E> + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Err(error) if !error.is_cancelled() => {
                let error = error.clone();
                capture(move || on_rejected(error).map_err(Into::into))
            }
            other => other.clone(),
        })
    }

    /// Recovers only from errors that downcast to `E`.
    ///
    /// Any other rejection passes through unchanged.
    pub fn catch_as<E, F>(&self, on_rejected: F) -> Self
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> Result<T, PromiseError> + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Err(error) if !error.is_cancelled() => match error.downcast_ref::<E>() {
                Some(typed) => capture(move || on_rejected(typed)),
                None => Err(error.clone()),
            },
            other => other.clone(),
        })
    }

    /// Lets the handler decide whether it handles the rejection.
    ///
    /// [`Recovery::Unhandled`] rejects the child with the original error.
    pub fn recover<F>(&self, decide: F) -> Self
    where
        F: FnOnce(&PromiseError) -> Recovery<T> + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Err(error) if !error.is_cancelled() => capture(move || match decide(error) {
                Recovery::Handled(value) => Ok(value),
                Recovery::Unhandled => Err(error.clone()),
            }),
            other => other.clone(),
        })
    }

    /// Runs `f` on every outcome, including cancellation.
    ///
    /// The child settles with the parent's outcome unless `f` fails, in
    /// which case it rejects with `f`'s error.
    pub fn finally<E, F>(&self, f: F) -> Self
    where
        E: Into<PromiseError>,
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        self.derive_inner(true, move |outcome| {
            match capture(move || f().map_err(Into::into)) {
                Ok(()) => outcome.clone(),
                Err(error) => Err(error),
            }
        })
    }

    /// Observes the value without changing it.
    ///
    /// A panic in `f` is logged and swallowed.
    pub fn tap<F>(&self, f: F) -> Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.derive(move |outcome| {
            if let Ok(value) = outcome {
                if catch_unwind(AssertUnwindSafe(|| f(value))).is_err() {
                    warn!("tap handler panicked; ignoring");
                }
            }
            outcome.clone()
        })
    }

    /// Observes a rejection without changing it.
    ///
    /// Not invoked for cancellation. A panic in `f` is logged and swallowed.
    pub fn tap_catch<F>(&self, f: F) -> Self
    where
        F: FnOnce(&PromiseError) + Send + 'static,
    {
        self.derive(move |outcome| {
            if let Err(error) = outcome {
                if !error.is_cancelled() && catch_unwind(AssertUnwindSafe(|| f(error))).is_err() {
                    warn!("tap_catch handler panicked; ignoring");
                }
            }
            outcome.clone()
        })
    }

    /// Hands the outcome to `f` together with the child's resolver.
    ///
    /// `f` decides how and when the child settles: it may settle inline,
    /// transform the outcome, or move the resolver elsewhere and settle
    /// later. An inline settlement inherits the parent's sync flag.
    /// Cancellation passes through without calling `f`. A panic in `f`
    /// rejects the child unless it was already settled.
    pub fn decorate<F>(&self, f: F) -> Self
    where
        F: FnOnce(Outcome<T>, Resolver<T>) + Send + 'static,
    {
        let child = self.create_child::<T>();
        let target = child.clone();
        self.subscribe(move |outcome, synchronous| {
            if !target.is_pending() {
                return;
            }
            if matches!(outcome, Err(error) if error.is_cancelled()) {
                target.settle(outcome.clone(), synchronous);
                return;
            }
            let scope = OwnerScope::enter();
            if !synchronous {
                scope.leave();
            }
            let resolver = Resolver::new(target.clone(), Arc::clone(&scope));
            let outcome = outcome.clone();
            let decorated = capture(move || {
                f(outcome, resolver);
                Ok(())
            });
            scope.leave();
            if let Err(error) = decorated {
                target.settle(Err(error), synchronous);
            }
        });
        child
    }

    /// Converts the value with [`Into`].
    pub fn cast<R>(&self) -> Promise<R>
    where
        R: Clone + Send + 'static,
        T: Into<R>,
    {
        self.map(Into::into)
    }
}
