//! Deadlines on promises.
//!
//! `timeout` derives a child that races the source against a timer:
//!
//! - source settles first: the timer is disposed and the child takes the
//!   source's outcome;
//! - timer fires first: the child rejects with [`PromiseError::Timeout`] and
//!   the source is cancelled;
//! - the child is cancelled: the timer is disposed and the source is
//!   cancelled under the usual tree rules;
//! - the driver has shut down: the child rejects at once with
//!   [`TimerError::Shutdown`](crate::TimerError::Shutdown) and the source
//!   keeps running.

use crate::error::PromiseError;
use crate::promise::Promise;
use crate::time::{TimerDriver, TimerHandle};
use crate::tracing_compat::{debug, warn};
use crate::types::CancelReason;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Holds the timer until whichever side settles first disposes it.
#[derive(Debug, Default)]
struct TimerSlot(Mutex<Option<TimerHandle>>);

impl TimerSlot {
    fn store(&self, handle: TimerHandle) {
        *self.0.lock() = Some(handle);
    }

    fn dispose(&self) {
        let handle = self.0.lock().take();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Rejects with [`PromiseError::Timeout`] unless this promise settles
    /// within `after`.
    ///
    /// Uses the process-wide [`TimerDriver`].
    pub fn timeout(&self, after: Duration) -> Self {
        self.timeout_on(TimerDriver::global(), after)
    }

    /// Like [`timeout`](Self::timeout), on an explicit driver.
    pub fn timeout_on(&self, driver: &TimerDriver, after: Duration) -> Self {
        let child = self.create_child::<T>();
        let slot = Arc::new(TimerSlot::default());

        {
            let slot = Arc::clone(&slot);
            child.register_on_cancel(move || slot.dispose());
        }
        {
            let slot = Arc::clone(&slot);
            let target = child.clone();
            self.subscribe(move |outcome, synchronous| {
                slot.dispose();
                target.settle(outcome.clone(), synchronous);
            });
        }
        if !self.is_pending() {
            return child;
        }

        let target = child.clone();
        let source = self.clone();
        let scheduled = driver.schedule(after, move || {
            if target.settle(Err(PromiseError::timeout(after)), false) {
                debug!(promise = %source.id(), ?after, "timed out; cancelling source");
                source.cancel_with(CancelReason::timeout());
            }
        });
        let handle = match scheduled {
            Ok(handle) => handle,
            Err(error) => {
                warn!(promise = %self.id(), %error, "deadline not scheduled; rejecting");
                child.settle(Err(PromiseError::new(error)), true);
                return child;
            }
        };
        slot.store(handle);
        if !child.is_pending() {
            // Settled before the handle was stored.
            slot.dispose();
        }
        child
    }
}
