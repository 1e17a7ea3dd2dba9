//! Cancellation reason and kind types.
//!
//! Cancellation is a distinguished outcome, not an ordinary rejection. This
//! module defines the types that describe why a promise was cancelled. The
//! reason travels unchanged through every derived promise, so a consumer at
//! the end of a chain can tell a user cancel from a timeout or a failed
//! filter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelKind {
    /// Explicit cancellation requested by user code.
    User,
    /// The promise lost a race against a `timeout` timer.
    Timeout,
    /// Its chained children were cancelled (last child under `All`, any child
    /// under `Any`).
    ChildrenCancelled,
    /// An `all` aggregate containing this promise was cancelled.
    Aggregate,
    /// A `filter`/`join_on` predicate rejected the value.
    Filtered,
    /// A bridged future or task reported cancellation.
    TaskCancelled,
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::ChildrenCancelled => write!(f, "children cancelled"),
            Self::Aggregate => write!(f, "aggregate cancelled"),
            Self::Filtered => write!(f, "filtered"),
            Self::TaskCancelled => write!(f, "task cancelled"),
        }
    }
}

/// The reason for a cancellation, including kind and optional context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message.
    pub message: Option<String>,
}

impl CancelReason {
    /// Creates a new cancellation reason with the given kind.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user cancellation reason with a message.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(CancelKind::User).with_message(message)
    }

    /// Creates a timeout cancellation reason.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// Creates a reason for a parent cancelled by its children.
    #[must_use]
    pub const fn children_cancelled() -> Self {
        Self::new(CancelKind::ChildrenCancelled)
    }

    /// Creates a reason for an input cancelled with its `all` aggregate.
    #[must_use]
    pub const fn aggregate() -> Self {
        Self::new(CancelKind::Aggregate)
    }

    /// Creates a filtered cancellation reason.
    #[must_use]
    pub const fn filtered() -> Self {
        Self::new(CancelKind::Filtered)
    }

    /// Creates a reason for a cancelled bridged task.
    #[must_use]
    pub const fn task_cancelled() -> Self {
        Self::new(CancelKind::TaskCancelled)
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns the kind of this cancellation reason.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}
