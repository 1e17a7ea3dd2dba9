//! Interop with `std::future::Future`.
//!
//! - [`Task`]: a promise viewed as a future (`Promise::to_task`, `.await`)
//! - [`Promise::from_future`](crate::Promise::from_future): a future driven
//!   to completion as a promise, without an executor
//!
//! State mapping between the two worlds:
//!
//! | Promise     | Task                     |
//! |-------------|--------------------------|
//! | `Pending`   | [`TaskStatus::Pending`]  |
//! | `Fulfilled` | [`TaskStatus::Completed`]|
//! | `Rejected`  | [`TaskStatus::Faulted`]  |
//! | `Cancelled` | [`TaskStatus::Cancelled`]|

mod from_future;
mod task;

pub use task::{Task, TaskStatus};
