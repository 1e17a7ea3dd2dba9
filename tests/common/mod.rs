//! Shared helpers for the integration suites.

#![allow(dead_code, unused_macros)]

use parking_lot::Mutex;
use pledge::{Promise, Resolver};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

static INIT: Once = Once::new();

/// Installs a test-writer subscriber filtered by `RUST_LOG` (default `pledge=debug`).
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pledge=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Logs the start of a test.
pub fn init_test(name: &str) {
    init_test_logging();
    tracing::info!(test = name, "=== TEST START ===");
}

/// Logs the successful end of a test.
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

/// A pending promise together with the resolver that settles it.
pub fn deferred<T: Clone + Send + 'static>() -> (Promise<T>, Resolver<T>) {
    let slot = Arc::new(Mutex::new(None));
    let captured = Arc::clone(&slot);
    let promise = Promise::new(move |resolver| *captured.lock() = Some(resolver));
    let resolver = slot.lock().take().expect("owner runs synchronously");
    (promise, resolver)
}

/// Polls `condition` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
