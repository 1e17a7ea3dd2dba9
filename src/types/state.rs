//! Promise lifecycle state and child cancellation policy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of a promise.
///
/// ```text
///            ┌──► Fulfilled
/// Pending ───┼──► Rejected
///            └──► Cancelled
/// ```
///
/// Terminal states are final: no transition leaves them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromiseState {
    /// Not yet settled.
    #[default]
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with an ordinary error.
    Rejected,
    /// Settled with a cancellation error.
    Cancelled,
}

impl PromiseState {
    /// Returns true for every state except [`Pending`](Self::Pending).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns the state name in lowercase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How cancellation of derived promises flows back to their parent.
///
/// - [`All`](Self::All): the parent is cancelled once every child created by
///   chaining has been cancelled. Cancelling only some children leaves the
///   parent pending.
/// - [`Any`](Self::Any): cancelling a single child cancels the parent.
///
/// The mode is fixed when the promise is built and children inherit it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildCancelMode {
    /// Parent cancels when its last live child cancels.
    #[default]
    All,
    /// Parent cancels when any child cancels.
    Any,
}

impl fmt::Display for ChildCancelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Any => f.write_str("any"),
        }
    }
}
