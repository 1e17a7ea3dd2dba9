//! Promise combinators.
//!
//! - [`all`]: Wait for every promise, keeping input order; fail fast
//! - [`join`]: Wait for two promises of different types
//! - [`race`]: Settle with the first promise that settles
//! - [`delay`]: A promise that fulfills after a duration
//! - [`timeout`](crate::Promise::timeout): Reject a promise that takes too long
//! - [`try_with`]: Capture a fallible or panicking computation as a promise
//! - [`filter`](crate::Promise::filter), [`zip`](crate::Promise::zip),
//!   [`join_on`](crate::Promise::join_on): Query-style helpers
//!
//! Aggregates built here (`all`, `join`) use [`ChildCancelMode::Any`]:
//! cancelling the aggregate cancels every input and an input's cancellation
//! cancels the aggregate.
//!
//! [`ChildCancelMode::Any`]: crate::ChildCancelMode::Any

pub mod all;
pub mod attempt;
pub mod delay;
pub mod query;
pub mod race;
pub mod timeout;

pub use all::{all, join};
pub use attempt::{try_promise, try_with};
pub use delay::{delay, delay_on};
pub use race::race;
