//! Ordered registry of actions to run when a promise is cancelled.
//!
//! The signal moves through three states:
//!
//! ```text
//! Armed ──fire()──► Fired      (actions ran once, in registration order)
//!   │
//!   └──clear()───► Cleared     (promise settled normally, actions dropped)
//! ```
//!
//! Registering on a fired signal runs the action immediately. Registering on
//! a cleared signal drops the action: the promise can no longer be
//! cancelled. Panics raised by actions are caught and discarded so that one
//! faulty action cannot prevent the others from running.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A cancellation action.
pub type CancelAction = Box<dyn FnOnce() + Send + 'static>;

type ActionList = SmallVec<[CancelAction; 2]>;

enum SignalState {
    Armed(ActionList),
    Fired,
    Cleared,
}

/// Fire-once list of cancellation actions.
pub struct CancellationSignal {
    state: Mutex<SignalState>,
}

impl CancellationSignal {
    /// Creates an armed signal with no actions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::Armed(SmallVec::new())),
        }
    }

    /// Registers an action.
    ///
    /// Runs it immediately when the signal has already fired.
    pub fn register(&self, action: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        match &mut *state {
            SignalState::Armed(actions) => actions.push(Box::new(action)),
            SignalState::Fired => {
                drop(state);
                run_action(Box::new(action));
            }
            SignalState::Cleared => {}
        }
    }

    /// Runs every registered action once, in registration order.
    ///
    /// Returns false if the signal had already fired or been cleared.
    pub fn fire(&self) -> bool {
        let actions = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SignalState::Fired) {
                SignalState::Armed(actions) => actions,
                previous => {
                    *state = previous;
                    return false;
                }
            }
        };
        for action in actions {
            run_action(action);
        }
        true
    }

    /// Drops every registered action without running it.
    ///
    /// Has no effect on a signal that already fired.
    pub fn clear(&self) {
        let actions = {
            let mut state = self.state.lock();
            if !matches!(*state, SignalState::Armed(_)) {
                return;
            }
            std::mem::replace(&mut *state, SignalState::Cleared)
        };
        // Captured state is released outside the guard.
        drop(actions);
    }

    /// Returns true once [`fire`](Self::fire) has run.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        matches!(*self.state.lock(), SignalState::Fired)
    }

    /// Returns the number of actions waiting to run.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        match &*self.state.lock() {
            SignalState::Armed(actions) => actions.len(),
            SignalState::Fired | SignalState::Cleared => 0,
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock() {
            SignalState::Armed(_) => "armed",
            SignalState::Fired => "fired",
            SignalState::Cleared => "cleared",
        };
        f.debug_struct("CancellationSignal")
            .field("state", &state)
            .finish()
    }
}

fn run_action(action: CancelAction) {
    if catch_unwind(AssertUnwindSafe(action)).is_err() {
        crate::tracing_compat::warn!("cancel action panicked; ignoring");
    }
}
