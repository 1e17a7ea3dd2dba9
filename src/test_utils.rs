//! Test helpers: logging setup and structured assertion macros.
//!
//! Tests call [`init_test_logging`] once and bracket their body with
//! [`test_phase!`](crate::test_phase) / [`test_complete!`](crate::test_complete).
//! [`assert_with_log!`](crate::assert_with_log) logs the expected and actual
//! values before asserting, which keeps failures readable in threaded tests.

use std::sync::Once;
use std::time::{Duration, Instant};

static INIT: Once = Once::new();

/// Installs a `tracing` subscriber that writes through the test harness.
///
/// The filter is taken from `RUST_LOG` when set, otherwise `pledge=debug`.
/// Safe to call from every test.
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

/// Polls `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition was observed. Used by tests that complete
/// promises from background threads or the timer thread.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Marks the start of a test in the log.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST START ===");
    };
}

/// Marks the successful end of a test in the log.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

/// Assertion with logging for better test output.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            tracing::error!(
                message = $msg,
                expected = ?$expected,
                actual = ?$actual,
                "Assertion failed"
            );
        }
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
