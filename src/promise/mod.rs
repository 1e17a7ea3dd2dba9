//! The [`Promise`] node.
//!
//! A promise is a cheap, clonable handle over shared state: an exactly-once
//! [`CompletionCore`], a [`CancellationSignal`] and the bookkeeping for its
//! cancellation tree. Clones observe and control the same promise.
//!
//! # Cancellation trees
//!
//! Every promise derived by chaining (`then`, `catch`, `finally`, ...) is a
//! *child* of the promise it was derived from. Children share the parent's
//! [`ChildCancelMode`] and register an on-cancel hook on themselves:
//!
//! - under [`ChildCancelMode::All`] the parent counts its live children and
//!   is cancelled when the last one is cancelled;
//! - under [`ChildCancelMode::Any`] the first cancelled child cancels the
//!   parent.
//!
//! Cancelling the parent cancels every child through ordinary outcome
//! propagation: cancellation passes through all reject handlers untouched.
//!
//! # Module Structure
//!
//! - `owner`: [`Resolver`] and [`OnCancel`], the owner-facing half
//! - `chain`: value and error handlers (`then`, `catch`, `finally`, taps,
//!   `decorate`)
//! - `unwrap`: handlers that return promises (`and_then`, `or_else`,
//!   `flatten`, awaited taps)
//! - `erased`: [`AnyPromise`] and coercion at dynamic dispatch boundaries

mod chain;
mod erased;
mod owner;
mod unwrap;

pub use chain::Recovery;
pub use erased::{AnyPromise, AnyValue};
pub use owner::{OnCancel, Resolver};

use crate::core::{CancellationSignal, CompletionCore, Outcome};
use crate::error::{PanicError, PromiseError};
use crate::tracing_compat::{debug, warn};
use crate::types::{CancelReason, ChildCancelMode, PromiseId, PromiseState};
use owner::OwnerScope;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A deferred value that fulfills, rejects or is cancelled exactly once.
///
/// # Example
///
/// ```
/// use pledge::{Promise, PromiseState};
///
/// let (tx, rx) = std::sync::mpsc::channel();
/// let promise = Promise::<u32>::new(move |resolver| {
///     tx.send(resolver).unwrap();
/// });
/// let labelled = promise.map(|n| format!("n={n}"));
///
/// rx.recv().unwrap().resolve(5);
/// assert_eq!(labelled.wait().unwrap(), "n=5");
/// assert_eq!(promise.state(), PromiseState::Fulfilled);
/// ```
pub struct Promise<T> {
    inner: Arc<PromiseInner<T>>,
}

struct PromiseInner<T> {
    id: PromiseId,
    mode: ChildCancelMode,
    core: CompletionCore<T>,
    signal: CancellationSignal,
    /// Chained children not yet cancelled. Only counted under `All`.
    live_children: AtomicUsize,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A non-owning link to a promise.
///
/// Back links (child to parent, aggregate to input) use this so that a
/// pending tree nobody can reach is freed.
pub(crate) struct WeakPromise<T> {
    inner: Weak<PromiseInner<T>>,
}

impl<T> WeakPromise<T> {
    pub(crate) fn upgrade(&self) -> Option<Promise<T>> {
        self.inner.upgrade().map(|inner| Promise { inner })
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates a promise from an owner closure.
    ///
    /// The owner runs exactly once, synchronously, before `new` returns. It
    /// may settle the promise right away or move the [`Resolver`] elsewhere.
    /// A panic inside the owner rejects the promise with
    /// [`PromiseError::Panicked`]. The promise uses [`ChildCancelMode::All`].
    pub fn new<F>(owner: F) -> Self
    where
        F: FnOnce(Resolver<T>),
    {
        Self::with_mode(ChildCancelMode::All, |resolver, _| owner(resolver))
    }

    /// Creates a promise whose owner can register on-cancel actions.
    ///
    /// Uses [`ChildCancelMode::All`].
    pub fn cancellable<F>(owner: F) -> Self
    where
        F: FnOnce(Resolver<T>, OnCancel<'_>),
    {
        Self::with_mode(ChildCancelMode::All, owner)
    }

    /// Creates a promise with an explicit child cancellation mode.
    pub fn with_mode<F>(mode: ChildCancelMode, owner: F) -> Self
    where
        F: FnOnce(Resolver<T>, OnCancel<'_>),
    {
        let promise = Self::pending(mode);
        let scope = OwnerScope::enter();
        let resolver = Resolver::new(promise.clone(), Arc::clone(&scope));
        let signal = &promise.inner.signal;
        let result = catch_unwind(AssertUnwindSafe(|| owner(resolver, OnCancel::new(signal))));
        scope.leave();
        if let Err(payload) = result {
            let error = PanicError::from_payload(payload.as_ref());
            warn!(promise = %promise.id(), panic = %error.message(), "owner panicked; rejecting");
            promise.settle(Err(error.into()), true);
        }
        promise
    }

    /// Creates a promise already fulfilled with `value`.
    ///
    /// Settled promises use [`ChildCancelMode::Any`] and report
    /// `completed_synchronously() == true`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self::settled(Ok(value), true)
    }

    /// Creates a promise already rejected with `error`.
    ///
    /// Rejecting with a cancellation error produces a cancelled promise.
    #[must_use]
    pub fn rejected(error: impl Into<PromiseError>) -> Self {
        Self::settled(Err(error.into()), true)
    }

    /// Creates a promise already cancelled with `reason`.
    #[must_use]
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::settled(Err(PromiseError::cancelled(reason)), true)
    }

    /// Creates a settled promise with an explicit sync flag.
    #[must_use]
    pub fn settled(outcome: Outcome<T>, synchronous: bool) -> Self {
        let cancelled = matches!(&outcome, Err(error) if error.is_cancelled());
        let signal = CancellationSignal::new();
        if cancelled {
            signal.fire();
        } else {
            signal.clear();
        }
        Self {
            inner: Arc::new(PromiseInner {
                id: PromiseId::next(),
                mode: ChildCancelMode::Any,
                core: CompletionCore::settled(outcome, synchronous),
                signal,
                live_children: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn pending(mode: ChildCancelMode) -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                id: PromiseId::next(),
                mode,
                core: CompletionCore::new(),
                signal: CancellationSignal::new(),
                live_children: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns the identifier used in log events.
    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    /// Returns the child cancellation mode.
    #[must_use]
    pub fn mode(&self) -> ChildCancelMode {
        self.inner.mode
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        self.inner.core.state()
    }

    /// Returns true while the promise has not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// Returns true if the promise settled on the constructing thread while
    /// its owner was still running (or was created settled).
    #[must_use]
    pub fn completed_synchronously(&self) -> bool {
        self.inner.core.completed_synchronously()
    }

    /// Returns the number of chained children that have not been cancelled.
    ///
    /// Always zero under [`ChildCancelMode::Any`].
    #[must_use]
    pub fn live_children(&self) -> usize {
        self.inner.live_children.load(Ordering::Acquire)
    }

    /// Returns the outcome without blocking, if settled.
    #[must_use]
    pub fn try_result(&self) -> Option<Outcome<T>> {
        self.inner.core.peek()
    }

    /// Blocks the calling thread until the promise settles.
    ///
    /// A rejection returns the stored error; clones share identity with the
    /// error every other observer sees. Waiters wake as soon as the outcome
    /// is stored, possibly before continuations on the settling thread have
    /// finished.
    pub fn wait(&self) -> Outcome<T> {
        self.inner.core.wait()
    }

    /// Blocks until the promise settles or `timeout` elapses.
    ///
    /// Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<T>> {
        self.inner.core.wait_timeout(timeout)
    }

    /// Cancels the promise with a user reason.
    ///
    /// Returns true if this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        self.cancel_with(CancelReason::default())
    }

    /// Cancels the promise with the given reason.
    ///
    /// On success the on-cancel actions run first (in registration order),
    /// then the continuations observe the cancellation.
    pub fn cancel_with(&self, reason: CancelReason) -> bool {
        debug!(promise = %self.inner.id, reason = %reason, "cancel requested");
        self.settle(Err(PromiseError::cancelled(reason)), true)
    }

    /// Runs `f` if the promise is cancelled.
    ///
    /// Runs immediately when the promise is already cancelled. Does not
    /// create a child, so it never affects the cancellation tree.
    pub fn on_cancelled<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&CancelReason) + Send + 'static,
    {
        self.subscribe(move |outcome, _| {
            if let Err(PromiseError::Cancelled(cancelled)) = outcome {
                if catch_unwind(AssertUnwindSafe(|| f(&cancelled.reason))).is_err() {
                    warn!("on_cancelled observer panicked; ignoring");
                }
            }
        });
        self
    }

    /// Returns true if both handles refer to the same promise.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Performs the single completion of this promise.
    ///
    /// Cancellation fires the signal before continuations run; any other
    /// outcome drops the registered on-cancel actions.
    pub(crate) fn settle(&self, outcome: Outcome<T>, synchronous: bool) -> bool {
        let Some(completion) = self.inner.core.try_complete(outcome, synchronous) else {
            return false;
        };
        let state = completion.state();
        debug!(promise = %self.inner.id, state = %state, synchronous, "promise settled");
        if state == PromiseState::Cancelled {
            self.inner.signal.fire();
        } else {
            self.inner.signal.clear();
        }
        completion.run();
        true
    }

    /// Registers a raw reaction that is not a child.
    pub(crate) fn subscribe<F>(&self, reaction: F)
    where
        F: FnOnce(&Outcome<T>, bool) + Send + 'static,
    {
        self.inner.core.subscribe(Box::new(reaction));
    }

    /// Registers an on-cancel action on this promise.
    pub(crate) fn register_on_cancel<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.signal.register(action);
    }

    /// Creates a pending child in this promise's cancellation tree.
    pub(crate) fn create_child<R: Clone + Send + 'static>(&self) -> Promise<R> {
        let child = Promise::<R>::pending(self.inner.mode);
        if self.inner.mode == ChildCancelMode::All {
            self.inner.live_children.fetch_add(1, Ordering::AcqRel);
        }
        let parent = self.downgrade();
        child.register_on_cancel(move || {
            if let Some(parent) = parent.upgrade() {
                parent.child_cancelled();
            }
        });
        child
    }

    pub(crate) fn downgrade(&self) -> WeakPromise<T> {
        WeakPromise {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn child_cancelled(&self) {
        let cancel_parent = match self.inner.mode {
            ChildCancelMode::Any => true,
            ChildCancelMode::All => self.inner.live_children.fetch_sub(1, Ordering::AcqRel) == 1,
        };
        if cancel_parent && self.is_pending() {
            debug!(promise = %self.inner.id, mode = %self.inner.mode, "children cancelled; cancelling parent");
            self.cancel_with(CancelReason::children_cancelled());
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("mode", &self.inner.mode)
            .finish()
    }
}

/// Runs a handler, turning a panic into [`PromiseError::Panicked`].
pub(crate) fn capture<R>(handler: impl FnOnce() -> Outcome<R>) -> Outcome<R> {
    catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|payload| {
        let error = PanicError::from_payload(payload.as_ref());
        warn!(panic = %error.message(), "handler panicked; rejecting");
        Err(error.into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use crate::types::CancelKind;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;

    fn init_test(test_name: &str) {
        init_test_logging();
        crate::test_phase!(test_name);
    }

    fn deferred<T: Clone + Send + 'static>(mode: ChildCancelMode) -> (Promise<T>, Resolver<T>) {
        let slot = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&slot);
        let promise = Promise::with_mode(mode, move |resolver, _| {
            *captured.lock() = Some(resolver);
        });
        let resolver = slot.lock().take().expect("owner ran");
        (promise, resolver)
    }

    #[test]
    fn owner_resolution_is_synchronous() {
        init_test("owner_resolution_is_synchronous");
        let promise = Promise::new(|resolver| {
            resolver.resolve(5);
        });
        crate::assert_with_log!(
            promise.state() == PromiseState::Fulfilled,
            "fulfilled inline",
            PromiseState::Fulfilled,
            promise.state()
        );
        assert!(promise.completed_synchronously());
        assert_eq!(promise.wait().ok(), Some(5));
        crate::test_complete!("owner_resolution_is_synchronous");
    }

    #[test]
    fn later_resolution_is_asynchronous() {
        init_test("later_resolution_is_asynchronous");
        let (promise, resolver) = deferred::<i32>(ChildCancelMode::All);
        assert!(promise.is_pending());
        assert!(resolver.resolve(1));
        assert!(!promise.completed_synchronously());
        crate::test_complete!("later_resolution_is_asynchronous");
    }

    #[test]
    fn second_completion_is_ignored() {
        init_test("second_completion_is_ignored");
        let (promise, resolver) = deferred::<i32>(ChildCancelMode::All);
        let first = resolver.resolve(1);
        let second = resolver.reject("late");
        let third = promise.cancel();
        crate::assert_with_log!(
            first && !second && !third,
            "only the first completion wins",
            (true, false, false),
            (first, second, third)
        );
        assert_eq!(promise.wait().ok(), Some(1));
        crate::test_complete!("second_completion_is_ignored");
    }

    #[test]
    fn owner_panic_rejects_synchronously() {
        init_test("owner_panic_rejects_synchronously");
        let promise = Promise::<i32>::new(|_| panic!("owner blew up"));
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert!(promise.completed_synchronously());
        let error = promise.wait().expect_err("rejected");
        assert_eq!(
            error.downcast_ref::<PanicError>().map(PanicError::message),
            Some("owner blew up")
        );
        crate::test_complete!("owner_panic_rejects_synchronously");
    }

    #[test]
    fn rejecting_with_cancellation_moves_to_cancelled() {
        init_test("rejecting_with_cancellation_moves_to_cancelled");
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let promise = Promise::<i32>::cancellable(move |resolver, on_cancel| {
            on_cancel.register(move || flag.store(true, Ordering::SeqCst));
            resolver.reject(PromiseError::cancelled(CancelReason::user("owner")));
        });
        assert_eq!(promise.state(), PromiseState::Cancelled);
        assert!(fired.load(Ordering::SeqCst), "on-cancel ran");
        crate::test_complete!("rejecting_with_cancellation_moves_to_cancelled");
    }

    #[test]
    fn cancel_runs_actions_before_continuations() {
        init_test("cancel_runs_actions_before_continuations");
        let log = Arc::new(Mutex::new(Vec::new()));
        let action_log = Arc::clone(&log);
        let promise = Promise::<i32>::cancellable(move |_, on_cancel| {
            on_cancel.register(move || action_log.lock().push("action"));
        });
        let observer_log = Arc::clone(&log);
        promise.on_cancelled(move |reason| {
            assert_eq!(reason.kind(), CancelKind::User);
            observer_log.lock().push("observer");
        });
        assert!(promise.cancel());
        assert!(!promise.cancel());
        assert_eq!(log.lock().clone(), vec!["action", "observer"]);
        crate::test_complete!("cancel_runs_actions_before_continuations");
    }

    #[test]
    fn on_cancelled_after_cancel_runs_immediately() {
        init_test("on_cancelled_after_cancel_runs_immediately");
        let promise = Promise::<i32>::cancelled(CancelReason::timeout());
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        promise.on_cancelled(move |reason| *slot.lock() = Some(reason.kind()));
        assert_eq!(*seen.lock(), Some(CancelKind::Timeout));
        crate::test_complete!("on_cancelled_after_cancel_runs_immediately");
    }

    #[test]
    fn settled_constructors_use_any_mode() {
        init_test("settled_constructors_use_any_mode");
        let ok = Promise::resolved(1);
        let err = Promise::<i32>::rejected("nope");
        assert_eq!(ok.mode(), ChildCancelMode::Any);
        assert_eq!(err.state(), PromiseState::Rejected);
        assert!(err.completed_synchronously());
        let late = Promise::settled(Ok(2), false);
        assert!(!late.completed_synchronously());
        crate::test_complete!("settled_constructors_use_any_mode");
    }

    #[test]
    fn all_mode_cancels_parent_after_last_child() {
        init_test("all_mode_cancels_parent_after_last_child");
        let (parent, _resolver) = deferred::<i32>(ChildCancelMode::All);
        let a = parent.map(|v| v + 1);
        let b = parent.map(|v| v + 2);
        assert_eq!(parent.live_children(), 2);

        a.cancel();
        crate::assert_with_log!(
            parent.is_pending(),
            "parent survives first child",
            PromiseState::Pending,
            parent.state()
        );
        b.cancel();
        crate::assert_with_log!(
            parent.state() == PromiseState::Cancelled,
            "last child cancels parent",
            PromiseState::Cancelled,
            parent.state()
        );
        let error = parent.wait().expect_err("cancelled");
        assert_eq!(
            error.cancel_reason().map(CancelReason::kind),
            Some(CancelKind::ChildrenCancelled)
        );
        crate::test_complete!("all_mode_cancels_parent_after_last_child");
    }

    #[test]
    fn any_mode_cancels_parent_on_first_child() {
        init_test("any_mode_cancels_parent_on_first_child");
        let (parent, _resolver) = deferred::<i32>(ChildCancelMode::Any);
        let a = parent.map(|v| v + 1);
        let b = parent.map(|v| v + 2);
        assert_eq!(parent.live_children(), 0);
        a.cancel();
        assert_eq!(parent.state(), PromiseState::Cancelled);
        assert_eq!(b.state(), PromiseState::Cancelled);
        crate::test_complete!("any_mode_cancels_parent_on_first_child");
    }

    #[test]
    fn cancelling_parent_cancels_children() {
        init_test("cancelling_parent_cancels_children");
        let (parent, _resolver) = deferred::<i32>(ChildCancelMode::All);
        let child = parent.map(|v| v * 2);
        let grandchild = child.map(|v| v * 2);
        parent.cancel();
        assert_eq!(child.state(), PromiseState::Cancelled);
        assert_eq!(grandchild.state(), PromiseState::Cancelled);
        crate::test_complete!("cancelling_parent_cancels_children");
    }

    #[test]
    fn wait_sees_completion_from_another_thread() {
        init_test("wait_sees_completion_from_another_thread");
        let promise = Promise::new(|resolver| {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                resolver.resolve("done");
            });
        });
        assert_eq!(promise.wait().ok(), Some("done"));
        assert!(!promise.completed_synchronously());
        assert!(promise.wait_timeout(Duration::from_millis(1)).is_some());
        crate::test_complete!("wait_sees_completion_from_another_thread");
    }

    /// Sets a flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn unreachable_pending_chain_is_freed() {
        init_test("unreachable_pending_chain_is_freed");
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(Arc::clone(&dropped));
        let parent = Promise::<i32>::new(|_never_settled| {});
        let child = parent.map(move |value| {
            let _guard = &guard;
            value + 1
        });
        assert!(child.is_pending());
        drop(child);
        assert!(!dropped.load(Ordering::SeqCst));
        drop(parent);
        let freed = dropped.load(Ordering::SeqCst);
        crate::assert_with_log!(freed, "handler released with the tree", true, freed);
        crate::test_complete!("unreachable_pending_chain_is_freed");
    }

    #[test]
    fn back_link_does_not_keep_parent_alive() {
        init_test("back_link_does_not_keep_parent_alive");
        let parent = Promise::<i32>::new(|_never_settled| {});
        let weak = parent.downgrade();
        let child = parent.map(|value| value);
        drop(parent);
        assert!(weak.upgrade().is_none());
        assert!(child.cancel());
        assert_eq!(child.state(), PromiseState::Cancelled);
        crate::test_complete!("back_link_does_not_keep_parent_alive");
    }

    #[test]
    fn wait_timeout_on_pending_promise() {
        init_test("wait_timeout_on_pending_promise");
        let (promise, _resolver) = deferred::<i32>(ChildCancelMode::All);
        assert!(promise.wait_timeout(Duration::from_millis(5)).is_none());
        assert!(promise.try_result().is_none());
        crate::test_complete!("wait_timeout_on_pending_promise");
    }
}
