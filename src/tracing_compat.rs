//! Optional tracing integration.
//!
//! With the `tracing-integration` feature enabled this module re-exports the
//! `tracing` event macros. Without it the same macro names expand to nothing,
//! so call sites stay in place at zero cost.
//!
//! ```ignore
//! use crate::tracing_compat::debug;
//!
//! debug!(promise = %id, state = ?state, "promise settled");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    /// No-op stand-in for `tracing::trace!`.
    #[macro_export]
    #[doc(hidden)]
    macro_rules! __pledge_trace {
        ($($arg:tt)*) => {};
    }

    /// No-op stand-in for `tracing::debug!`.
    #[macro_export]
    #[doc(hidden)]
    macro_rules! __pledge_debug {
        ($($arg:tt)*) => {};
    }

    /// No-op stand-in for `tracing::warn!`.
    #[macro_export]
    #[doc(hidden)]
    macro_rules! __pledge_warn {
        ($($arg:tt)*) => {};
    }
}

#[cfg(not(feature = "tracing-integration"))]
pub use crate::{__pledge_debug as debug, __pledge_trace as trace, __pledge_warn as warn};
