//! Exactly-once completion gate.
//!
//! [`CompletionCore`] owns a promise's outcome, its synchronicity flag, the
//! list of reactions waiting for it and, when somebody blocks, a
//! [`WaitHandle`]. All four live behind one guard so that registration and
//! completion can never interleave in a way that loses a reaction.
//!
//! Completion is split in two steps. [`CompletionCore::try_complete`] performs
//! the `Pending → terminal` transition under the guard and hands back a
//! [`Completion`] token holding the drained reactions. Running the token
//! (outside the guard) releases blocked waiters and then invokes the
//! reactions in registration order, so a waiter never sleeps behind user
//! handlers. Callers can do work between the two steps, such as firing the
//! cancellation signal before reactions observe the outcome.

use super::wait::WaitHandle;
use crate::error::PromiseError;
use crate::types::PromiseState;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

/// The settled result of a promise.
pub type Outcome<T> = Result<T, PromiseError>;

/// A reaction to completion: receives the outcome and the sync flag.
pub type Reaction<T> = Box<dyn FnOnce(&Outcome<T>, bool) + Send + 'static>;

type ReactionList<T> = SmallVec<[Reaction<T>; 2]>;

struct CoreState<T> {
    outcome: Option<Outcome<T>>,
    synchronous: bool,
    reactions: ReactionList<T>,
    waiter: Option<Arc<WaitHandle>>,
}

/// Guarded outcome slot with its reaction list.
pub struct CompletionCore<T> {
    state: Mutex<CoreState<T>>,
}

impl<T: Clone + Send + 'static> CompletionCore<T> {
    /// Creates a pending core.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoreState {
                outcome: None,
                synchronous: false,
                reactions: SmallVec::new(),
                waiter: None,
            }),
        }
    }

    /// Creates a core that is already settled.
    #[must_use]
    pub fn settled(outcome: Outcome<T>, synchronous: bool) -> Self {
        Self {
            state: Mutex::new(CoreState {
                outcome: Some(outcome),
                synchronous,
                reactions: SmallVec::new(),
                waiter: None,
            }),
        }
    }

    /// Attempts the `Pending → terminal` transition.
    ///
    /// Returns `None` when the core is already terminal; the outcome is
    /// discarded in that case.
    #[must_use = "reactions only run when the completion is run"]
    pub fn try_complete(&self, outcome: Outcome<T>, synchronous: bool) -> Option<Completion<T>> {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return None;
        }
        let published = outcome.clone();
        state.outcome = Some(outcome);
        state.synchronous = synchronous;
        let reactions = std::mem::take(&mut state.reactions);
        let waiter = state.waiter.take();
        drop(state);
        Some(Completion {
            outcome: published,
            synchronous,
            reactions,
            waiter,
        })
    }

    /// Registers a reaction.
    ///
    /// A pending core stores it; a terminal core runs it right away on the
    /// calling thread with the stored outcome and stored sync flag.
    pub fn subscribe(&self, reaction: Reaction<T>) {
        let mut state = self.state.lock();
        match &state.outcome {
            None => state.reactions.push(reaction),
            Some(outcome) => {
                let outcome = outcome.clone();
                let synchronous = state.synchronous;
                drop(state);
                run_reaction(reaction, &outcome, synchronous);
            }
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        state_of(self.state.lock().outcome.as_ref())
    }

    /// Returns the sync flag (false while pending).
    #[must_use]
    pub fn completed_synchronously(&self) -> bool {
        let state = self.state.lock();
        state.outcome.is_some() && state.synchronous
    }

    /// Returns a copy of the outcome, if settled.
    #[must_use]
    pub fn peek(&self) -> Option<Outcome<T>> {
        self.state.lock().outcome.clone()
    }

    /// Returns the number of reactions waiting for completion.
    #[must_use]
    pub fn pending_reactions(&self) -> usize {
        self.state.lock().reactions.len()
    }

    /// Returns the wait handle, allocating it on first use.
    ///
    /// The handle of a terminal core is created already set.
    #[must_use]
    pub fn wait_handle(&self) -> Arc<WaitHandle> {
        let mut state = self.state.lock();
        if let Some(waiter) = &state.waiter {
            return Arc::clone(waiter);
        }
        let waiter = Arc::new(WaitHandle::new());
        if state.outcome.is_some() {
            waiter.set();
        } else {
            state.waiter = Some(Arc::clone(&waiter));
        }
        waiter
    }

    /// Blocks until the core settles and returns the outcome.
    pub fn wait(&self) -> Outcome<T> {
        loop {
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            self.wait_handle().wait();
        }
    }

    /// Blocks until the core settles or `timeout` elapses.
    ///
    /// Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<T>> {
        if let Some(outcome) = self.peek() {
            return Some(outcome);
        }
        self.wait_handle().wait_timeout(timeout);
        self.peek()
    }
}

impl<T: Clone + Send + 'static> Default for CompletionCore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CompletionCore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CompletionCore")
            .field("state", &state_of(state.outcome.as_ref()))
            .field("synchronous", &state.synchronous)
            .field("reactions", &state.reactions.len())
            .finish()
    }
}

/// The single completion notification produced by a successful
/// [`CompletionCore::try_complete`].
#[must_use = "reactions only run when the completion is run"]
pub struct Completion<T> {
    outcome: Outcome<T>,
    synchronous: bool,
    reactions: ReactionList<T>,
    waiter: Option<Arc<WaitHandle>>,
}

impl<T> Completion<T> {
    /// Returns the published outcome.
    #[must_use]
    pub fn outcome(&self) -> &Outcome<T> {
        &self.outcome
    }

    /// Returns the published state.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        state_of(Some(&self.outcome))
    }

    /// Releases blocked waiters, then invokes every drained reaction in
    /// registration order.
    pub fn run(self) {
        let Self {
            outcome,
            synchronous,
            reactions,
            waiter,
        } = self;
        if let Some(waiter) = waiter {
            waiter.set();
        }
        for reaction in reactions {
            run_reaction(reaction, &outcome, synchronous);
        }
    }
}

fn run_reaction<T>(reaction: Reaction<T>, outcome: &Outcome<T>, synchronous: bool) {
    if catch_unwind(AssertUnwindSafe(|| reaction(outcome, synchronous))).is_err() {
        crate::tracing_compat::warn!("promise reaction panicked; ignoring");
    }
}

pub(crate) fn state_of<T>(outcome: Option<&Outcome<T>>) -> PromiseState {
    match outcome {
        None => PromiseState::Pending,
        Some(Ok(_)) => PromiseState::Fulfilled,
        Some(Err(error)) if error.is_cancelled() => PromiseState::Cancelled,
        Some(Err(_)) => PromiseState::Rejected,
    }
}
