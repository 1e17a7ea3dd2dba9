//! Completion and cancellation primitives underneath [`Promise`](crate::Promise).
//!
//! - [`completion`]: Exactly-once outcome slot with its reaction list
//! - [`signal`]: Fire-once list of on-cancel actions
//! - [`wait`]: Lazily allocated blocking latch

pub mod completion;
pub mod signal;
pub mod wait;

pub use completion::{Completion, CompletionCore, Outcome, Reaction};
pub use signal::{CancelAction, CancellationSignal};
pub use wait::WaitHandle;
