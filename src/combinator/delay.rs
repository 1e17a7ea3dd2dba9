//! Timed fulfillment.

use crate::error::PromiseError;
use crate::promise::Promise;
use crate::time::TimerDriver;
use crate::tracing_compat::{trace, warn};
use std::time::Duration;

/// Returns a promise that fulfills with `()` once `duration` has elapsed.
///
/// Runs on the process-wide [`TimerDriver`]. Fulfillment always happens on
/// the timer thread, so the promise never completes synchronously, even for
/// a zero duration. Cancelling the promise disposes the timer.
pub fn delay(duration: Duration) -> Promise<()> {
    delay_on(TimerDriver::global(), duration)
}

/// Like [`delay`], on an explicit driver.
///
/// A driver that has shut down rejects the promise at once with
/// [`TimerError::Shutdown`](crate::TimerError::Shutdown).
pub fn delay_on(driver: &TimerDriver, duration: Duration) -> Promise<()> {
    Promise::cancellable(|resolver, on_cancel| {
        let fire = resolver.clone();
        let scheduled = driver.schedule(duration, move || {
            trace!(?duration, "delay elapsed");
            fire.resolve_with((), false);
        });
        let handle = match scheduled {
            Ok(handle) => handle,
            Err(error) => {
                warn!(%error, "delay not scheduled; rejecting");
                resolver.reject(PromiseError::new(error));
                return;
            }
        };
        on_cancel.register(move || {
            if handle.cancel() {
                trace!("delay cancelled; timer disposed");
            }
        });
    })
}
