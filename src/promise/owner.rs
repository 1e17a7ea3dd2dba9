//! The owner-facing half of a promise.
//!
//! An owner closure receives a [`Resolver`] to settle the promise and, for
//! cancellable promises, an [`OnCancel`] registrar. The registrar is borrowed
//! for the duration of the owner call only; once the owner returns, the set
//! of on-cancel actions is fixed.

use super::Promise;
use crate::core::{CancellationSignal, Outcome};
use crate::error::PromiseError;
use crate::types::{PromiseId, PromiseState};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

/// Tracks whether the owner closure is still running on its thread.
///
/// Completions made through a [`Resolver`] are synchronous exactly when
/// they happen on this thread before the owner returns.
#[derive(Debug)]
pub(crate) struct OwnerScope {
    thread: ThreadId,
    running: AtomicBool,
}

impl OwnerScope {
    pub(crate) fn enter() -> Arc<Self> {
        Arc::new(Self {
            thread: thread::current().id(),
            running: AtomicBool::new(true),
        })
    }

    pub(crate) fn leave(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn is_current(&self) -> bool {
        self.running.load(Ordering::Acquire) && thread::current().id() == self.thread
    }
}

/// Settles the promise it was created for.
///
/// Resolvers are clonable and `Send`; any clone may settle the promise, but
/// only the first completion takes effect. Every method that settles
/// returns whether it performed the completion.
pub struct Resolver<T> {
    promise: Promise<T>,
    scope: Arc<OwnerScope>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            scope: Arc::clone(&self.scope),
        }
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub(crate) fn new(promise: Promise<T>, scope: Arc<OwnerScope>) -> Self {
        Self { promise, scope }
    }

    /// Fulfills the promise with `value`.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the promise with `error`.
    ///
    /// A cancellation error cancels the promise instead.
    pub fn reject(&self, error: impl Into<PromiseError>) -> bool {
        self.settle(Err(error.into()))
    }

    /// Settles the promise with `outcome`, detecting the sync flag.
    pub fn settle(&self, outcome: Outcome<T>) -> bool {
        self.promise.settle(outcome, self.scope.is_current())
    }

    /// Fulfills the promise with an explicit sync flag.
    pub fn resolve_with(&self, value: T, synchronous: bool) -> bool {
        self.promise.settle(Ok(value), synchronous)
    }

    /// Rejects the promise with an explicit sync flag.
    pub fn reject_with(&self, error: impl Into<PromiseError>, synchronous: bool) -> bool {
        self.promise.settle(Err(error.into()), synchronous)
    }

    /// Settles the promise with whatever `source` settles with.
    ///
    /// The source keeps its own cancellation tree; cancelling the resolved
    /// promise does not cancel `source`.
    pub fn adopt(&self, source: &Promise<T>) {
        let target = self.promise.clone();
        source.subscribe(move |outcome, synchronous| {
            target.settle(outcome.clone(), synchronous);
        });
    }

    /// Returns the lifecycle state of the promise.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        self.promise.state()
    }

    /// Returns true while the promise is unsettled.
    ///
    /// Long-running owners poll this to stop work after a cancellation.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.promise.is_pending()
    }

    /// Returns the promise identifier.
    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.promise.id()
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise.id())
            .field("state", &self.promise.state())
            .finish()
    }
}

/// Registers on-cancel actions during the owner call.
///
/// Actions run once, in registration order, when the promise is cancelled,
/// before any continuation observes the cancellation. They are dropped
/// unrun when the promise settles any other way.
#[derive(Clone, Copy)]
pub struct OnCancel<'a> {
    signal: &'a CancellationSignal,
}

impl<'a> OnCancel<'a> {
    pub(crate) fn new(signal: &'a CancellationSignal) -> Self {
        Self { signal }
    }

    /// Registers an action to run on cancellation.
    pub fn register<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.signal.register(action);
    }
}

impl fmt::Debug for OnCancel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCancel").field("signal", self.signal).finish()
    }
}
