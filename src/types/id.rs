//! Identifier type for promises.
//!
//! Every promise receives a process-unique [`PromiseId`] at construction. The
//! id carries no semantics; it exists so log events from a parent, its
//! children and the timer thread can be correlated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PROMISE_ID: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a promise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PromiseId(u64);

impl PromiseId {
    /// Allocates the next identifier.
    #[inline]
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_PROMISE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a promise ID for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PromiseId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PromiseId({})", self.0)
    }
}

impl fmt::Display for PromiseId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = PromiseId::next();
        let b = PromiseId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn display_and_debug() {
        let id = PromiseId::new_for_test(7);
        assert_eq!(id.to_string(), "P7");
        assert_eq!(format!("{id:?}"), "PromiseId(7)");
        assert_eq!(id.as_u64(), 7);
    }
}
