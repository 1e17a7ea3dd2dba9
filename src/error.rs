//! Error types for promise rejection.
//!
//! Every rejected promise carries a [`PromiseError`]. The variants form the
//! taxonomy the engine relies on:
//!
//! - [`PromiseError::Cancelled`] is the distinguished cancellation error. It
//!   is the only error that moves a promise to
//!   [`PromiseState::Cancelled`](crate::PromiseState::Cancelled), it bypasses
//!   every `catch`-style handler, and it always reaches `finally` and
//!   `on_cancelled`.
//! - [`PromiseError::Timeout`] is produced only by
//!   [`Promise::timeout`](crate::Promise::timeout). It is an ordinary
//!   rejection and can be caught.
//! - [`PromiseError::Panicked`] is what a panicking owner or handler turns
//!   into. Panics never escape to the completing thread.
//! - [`PromiseError::InvalidCast`] reports a failed
//!   [`AnyPromise::coerce`](crate::AnyPromise::coerce).
//! - [`PromiseError::Failed`] wraps any user error. It is reference counted
//!   so that every child observing the rejection sees the same error
//!   instance.

use crate::types::CancelReason;
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A shareable, type-erased user error.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Result type used throughout the crate.
pub type Result<T, E = PromiseError> = std::result::Result<T, E>;

/// The error a promise rejects with.
#[derive(Debug, Clone, Error)]
pub enum PromiseError {
    /// The promise was cancelled.
    #[error(transparent)]
    Cancelled(#[from] CancelledError),
    /// A `timeout` timer fired before the promise settled.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    /// An owner closure or handler panicked.
    #[error(transparent)]
    Panicked(#[from] PanicError),
    /// A type-erased promise could not be coerced to the requested type.
    #[error(transparent)]
    InvalidCast(#[from] CastError),
    /// Any other error raised by an operation or handler.
    #[error(transparent)]
    Failed(SharedError),
}

/// Coarse classification of a [`PromiseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Cancellation.
    Cancelled,
    /// Timeout from the `timeout` combinator.
    Timeout,
    /// A captured panic.
    Panicked,
    /// Coercion mismatch.
    InvalidCast,
    /// Ordinary failure.
    Failed,
}

impl PromiseError {
    /// Wraps an arbitrary error.
    ///
    /// Passing a `PromiseError` returns it unchanged instead of nesting it.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        if let Some(existing) = (&error as &dyn Any).downcast_ref::<Self>() {
            return existing.clone();
        }
        Self::Failed(Arc::new(error))
    }

    /// Creates an ordinary failure from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(Arc::new(Message(message.into())))
    }

    /// Creates a cancellation error with the given reason.
    #[must_use]
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled(CancelledError::new(reason))
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout(TimeoutError::new(after))
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Panicked(_) => ErrorKind::Panicked,
            Self::InvalidCast(_) => ErrorKind::InvalidCast,
            Self::Failed(_) => ErrorKind::Failed,
        }
    }

    /// Returns true if this is the cancellation error.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns the cancellation reason, if this is a cancellation.
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            Self::Cancelled(cancelled) => Some(&cancelled.reason),
            _ => None,
        }
    }

    /// Attempts to view the underlying error as `E`.
    ///
    /// Works for wrapped user errors as well as the crate's own error
    /// structs (`TimeoutError`, `PanicError`, ...).
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Cancelled(inner) => (inner as &(dyn StdError + 'static)).downcast_ref(),
            Self::Timeout(inner) => (inner as &(dyn StdError + 'static)).downcast_ref(),
            Self::Panicked(inner) => (inner as &(dyn StdError + 'static)).downcast_ref(),
            Self::InvalidCast(inner) => (inner as &(dyn StdError + 'static)).downcast_ref(),
            Self::Failed(inner) => inner.downcast_ref(),
        }
    }

    /// Returns true if both errors are the same wrapped failure instance.
    ///
    /// Clones of a `Failed` error share identity; two separately created
    /// errors never do.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Failed(a), Self::Failed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<String> for PromiseError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<&'static str> for PromiseError {
    fn from(message: &'static str) -> Self {
        Self::msg(message)
    }
}

impl From<std::io::Error> for PromiseError {
    fn from(error: std::io::Error) -> Self {
        Self::Failed(Arc::new(error))
    }
}

/// Plain-message failure created by [`PromiseError::msg`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

/// The distinguished cancellation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("promise cancelled ({reason})")]
pub struct CancelledError {
    /// Why the promise was cancelled.
    pub reason: CancelReason,
}

impl CancelledError {
    /// Creates a cancellation error.
    #[must_use]
    pub const fn new(reason: CancelReason) -> Self {
        Self { reason }
    }
}

/// Rejection produced when a `timeout` timer wins the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("promise timed out after {after:?}")]
pub struct TimeoutError {
    /// The configured timeout.
    pub after: Duration,
}

impl TimeoutError {
    /// Creates a timeout error.
    #[must_use]
    pub const fn new(after: Duration) -> Self {
        Self { after }
    }
}

/// A panic captured from an owner closure or a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("panicked: {message}")]
pub struct PanicError {
    message: String,
}

impl PanicError {
    /// Creates a panic error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Builds a panic error from a `catch_unwind` payload.
    #[must_use]
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A failed coercion of a type-erased promise value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot coerce promise value to `{target}`")]
pub struct CastError {
    /// The requested type name.
    pub target: &'static str,
}

impl CastError {
    /// Creates a cast error for the requested type.
    #[must_use]
    pub fn to<R: 'static>() -> Self {
        Self {
            target: std::any::type_name::<R>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelKind;

    #[derive(Debug, PartialEq, Eq)]
    struct Boom(u32);

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom {}", self.0)
        }
    }

    impl StdError for Boom {}

    #[test]
    fn kinds() {
        assert_eq!(
            PromiseError::cancelled(CancelReason::default()).kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            PromiseError::timeout(Duration::from_millis(5)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            PromiseError::from(PanicError::new("x")).kind(),
            ErrorKind::Panicked
        );
        assert_eq!(
            PromiseError::from(CastError::to::<u8>()).kind(),
            ErrorKind::InvalidCast
        );
        assert_eq!(PromiseError::msg("bad").kind(), ErrorKind::Failed);
    }

    #[test]
    fn cancellation_exposes_reason() {
        let err = PromiseError::cancelled(CancelReason::timeout());
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert_eq!(err.cancel_reason().map(|r| r.kind), Some(CancelKind::Timeout));
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn downcast_user_and_builtin_errors() {
        let err = PromiseError::new(Boom(3));
        assert_eq!(err.downcast_ref::<Boom>(), Some(&Boom(3)));
        assert!(err.downcast_ref::<TimeoutError>().is_none());

        let timeout = PromiseError::timeout(Duration::from_secs(1));
        assert_eq!(
            timeout.downcast_ref::<TimeoutError>().map(|t| t.after),
            Some(Duration::from_secs(1))
        );
        assert!(timeout.downcast_ref::<Boom>().is_none());
    }

    #[test]
    fn new_does_not_nest_promise_errors() {
        let original = PromiseError::timeout(Duration::from_millis(1));
        let wrapped = PromiseError::new(original);
        assert!(wrapped.is_timeout());
    }

    #[test]
    fn clones_share_identity() {
        let err = PromiseError::new(Boom(1));
        let copy = err.clone();
        assert!(err.ptr_eq(&copy));
        assert!(!err.ptr_eq(&PromiseError::new(Boom(1))));
    }

    #[test]
    fn panic_payload_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(PanicError::from_payload(payload.as_ref()).message(), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(PanicError::from_payload(payload.as_ref()).message(), "owned");
        let payload: Box<dyn Any + Send> = Box::new(17_u8);
        assert_eq!(
            PanicError::from_payload(payload.as_ref()).message(),
            "non-string panic payload"
        );
    }

    #[test]
    fn conversions() {
        let from_str: PromiseError = "plain".into();
        assert_eq!(from_str.to_string(), "plain");
        let from_io: PromiseError =
            std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(from_io.downcast_ref::<std::io::Error>().is_some());
    }
}
