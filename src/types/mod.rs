//! Core types shared across the crate.
//!
//! - [`state`]: Promise lifecycle state and child cancellation policy
//! - [`cancel`]: Cancellation reason and kind types
//! - [`id`]: Promise identifiers for log correlation

pub mod cancel;
pub mod id;
pub mod state;

pub use cancel::{CancelKind, CancelReason};
pub use id::PromiseId;
pub use state::{ChildCancelMode, PromiseState};
