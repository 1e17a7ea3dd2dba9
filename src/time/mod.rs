//! Timers for the time-based combinators.
//!
//! [`delay`](crate::delay) and [`Promise::timeout`](crate::Promise::timeout)
//! schedule their deadlines on a [`TimerDriver`]. The process-wide driver
//! from [`TimerDriver::global`] is used unless a driver is passed
//! explicitly (`delay_on`, `timeout_on`).

mod driver;

pub use driver::{TimerCallback, TimerDriver, TimerError, TimerHandle};
