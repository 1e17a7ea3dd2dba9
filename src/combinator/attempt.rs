//! Capturing fallible computations as promises.

use crate::error::PromiseError;
use crate::promise::Promise;

/// Runs `f` now and wraps its result in a settled promise.
///
/// `Err` rejects; a panic rejects with [`PromiseError::Panicked`]. The
/// promise always completes synchronously.
pub fn try_with<T, E, F>(f: F) -> Promise<T>
where
    T: Clone + Send + 'static,
    E: Into<PromiseError>,
    F: FnOnce() -> Result<T, E>,
{
    Promise::new(|resolver| {
        resolver.settle(f().map_err(Into::into));
    })
}

/// Runs `f` now and adopts the promise it returns.
///
/// A panic rejects with [`PromiseError::Panicked`]. Cancelling the returned
/// promise cancels the adopted one.
pub fn try_promise<T, F>(f: F) -> Promise<T>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> Promise<T> + Send + 'static,
{
    Promise::resolved(()).and_then(move |()| f())
}
