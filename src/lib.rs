//! Pledge: cancel-aware promises for Rust.
//!
//! # Overview
//!
//! A [`Promise`] is a deferred value: a computation that will eventually
//! fulfill with a value, reject with an error, or be cancelled. Promises are
//! created by an *owner* closure that receives a [`Resolver`] (and optionally
//! an [`OnCancel`] registrar) and either completes the promise before
//! returning or hands the resolver to another thread.
//!
//! # Core Guarantees
//!
//! - **Exactly-once completion**: the first resolve/reject/cancel wins; later
//!   attempts are no-ops
//! - **No lost continuations**: registration and completion are serialized by
//!   one guard per promise; continuations run outside that guard
//! - **Cancellation trees**: cancelling derived promises propagates back to the
//!   producing operation under [`ChildCancelMode::All`] or
//!   [`ChildCancelMode::Any`]
//! - **Cancellation bypasses recovery**: `catch`-style handlers never observe a
//!   cancellation; `finally` always does
//! - **No executor**: work runs where the owner puts it; continuations run on
//!   the completing thread
//!
//! # Module Structure
//!
//! - [`types`]: Core types (state, cancel mode, cancel reasons, identifiers)
//! - [`error`](mod@error): The [`PromiseError`] taxonomy
//! - [`core`](mod@core): Completion gate, wait handle, cancellation signal
//! - [`promise`]: The [`Promise`] node, chaining and unwrapping
//! - [`combinator`]: `all`, `race`, `delay`, `timeout`, `try_with`, query helpers
//! - [`time`]: Timer driver used by the time-based combinators
//! - [`bridge`]: Interop with `std::future::Future`
//! - [`config`]: Timer configuration
//! - [`tracing_compat`]: Optional tracing integration (requires `tracing-integration` feature)
//!
//! # Example
//!
//! ```
//! use pledge::{Promise, PromiseState};
//!
//! let promise = Promise::new(|resolver| {
//!     resolver.resolve(21);
//! });
//! let doubled = promise.map(|v| v * 2);
//!
//! assert_eq!(doubled.state(), PromiseState::Fulfilled);
//! assert_eq!(doubled.wait().unwrap(), 42);
//! assert!(doubled.completed_synchronously());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]

pub mod bridge;
pub mod combinator;
pub mod config;
pub mod core;
pub mod error;
pub mod promise;
pub mod time;
pub mod tracing_compat;
pub mod types;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use bridge::{Task, TaskStatus};
pub use combinator::{all, delay, delay_on, join, race, try_promise, try_with};
pub use config::TimerConfig;
pub use error::{
    CancelledError, CastError, ErrorKind, PanicError, PromiseError, Result, TimeoutError,
};
pub use promise::{AnyPromise, OnCancel, Promise, Recovery, Resolver};
pub use time::{TimerDriver, TimerError, TimerHandle};
pub use types::{CancelKind, CancelReason, ChildCancelMode, PromiseId, PromiseState};
