//! Deadline-ordered timer driver running on a dedicated thread.
//!
//! Registrations live in a [`Slab`] keyed by a small index; a min-heap of
//! `(deadline, key, generation)` entries orders them. Cancelling removes the
//! slab slot and leaves the heap entry behind; stale entries are discarded
//! when they reach the top of the heap. Generations make a reused slab key
//! unambiguous.
//!
//! Callbacks run on the timer thread with the driver lock released, so a
//! callback may schedule or cancel other timers.

use crate::config::TimerConfig;
use crate::tracing_compat::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use slab::Slab;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// A callback run when its deadline passes.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Errors from scheduling a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    /// The driver has shut down and accepts no new timers.
    #[error("timer driver is shut down")]
    Shutdown,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct HeapEntry {
    deadline: Instant,
    key: usize,
    generation: u64,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Registration {
    generation: u64,
    callback: TimerCallback,
}

#[derive(Default)]
struct TimerState {
    heap: BinaryHeap<HeapEntry>,
    registrations: Slab<Registration>,
    next_generation: u64,
    shutdown: bool,
}

impl TimerState {
    fn is_live(&self, entry: &HeapEntry) -> bool {
        self.registrations
            .get(entry.key)
            .is_some_and(|r| r.generation == entry.generation)
    }

    /// Drops stale entries from the top of the heap and returns the earliest
    /// live deadline.
    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(top) = self.heap.peek() {
            if self.is_live(top) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Removes every live registration whose deadline is `<= now`.
    fn collect_expired(&mut self, now: Instant) -> Vec<TimerCallback> {
        let mut expired = Vec::new();
        while let Some(top) = self.heap.peek().copied() {
            if top.deadline > now {
                break;
            }
            self.heap.pop();
            if self.is_live(&top) {
                expired.push(self.registrations.remove(top.key).callback);
            }
        }
        expired
    }
}

struct Shared {
    state: Mutex<TimerState>,
    condvar: Condvar,
    fired: AtomicU64,
}

impl Shared {
    fn cancel(&self, key: usize, generation: u64) -> bool {
        let removed = {
            let mut state = self.state.lock();
            if state
                .registrations
                .get(key)
                .is_some_and(|r| r.generation == generation)
            {
                Some(state.registrations.remove(key))
            } else {
                None
            }
        };
        // The callback (and whatever it captured) drops outside the lock.
        removed.is_some()
    }

    fn is_scheduled(&self, key: usize, generation: u64) -> bool {
        self.state
            .lock()
            .registrations
            .get(key)
            .is_some_and(|r| r.generation == generation)
    }
}

/// Handle to a scheduled timer.
///
/// Dropping the handle does not cancel the timer. Handles do not keep the
/// driver alive.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Weak<Shared>,
    key: usize,
    generation: u64,
}

impl TimerHandle {
    /// Cancels the timer.
    ///
    /// Returns true if the timer was still scheduled and will now never fire.
    /// Returns false once it has fired or was already cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .shared
            .upgrade()
            .is_some_and(|shared| shared.cancel(self.key, self.generation));
        if cancelled {
            trace!(key = self.key, generation = self.generation, "timer disposed");
        }
        cancelled
    }

    /// Returns true while the timer is scheduled and has not fired.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.is_scheduled(self.key, self.generation))
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Runs timer callbacks on a dedicated thread.
///
/// Dropping the driver stops its thread; timers that have not fired are
/// dropped without running. The process-wide driver returned by
/// [`TimerDriver::global`] is never dropped.
///
/// # Example
///
/// ```
/// use pledge::TimerDriver;
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// let driver = TimerDriver::new();
/// let (tx, rx) = mpsc::channel();
/// driver
///     .schedule(Duration::from_millis(5), move || tx.send(()).unwrap())
///     .unwrap();
/// rx.recv().unwrap();
/// ```
pub struct TimerDriver {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    config: TimerConfig,
}

impl TimerDriver {
    /// Creates a driver with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the timer thread cannot be spawned.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TimerConfig::default())
            .unwrap_or_else(|err| panic!("failed to spawn timer thread: {err}"))
    }

    /// Creates a driver whose thread follows `config`.
    pub fn with_config(config: TimerConfig) -> io::Result<Self> {
        config
            .validate()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState::default()),
            condvar: Condvar::new(),
            fired: AtomicU64::new(0),
        });
        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let worker = Arc::clone(&shared);
        let handle = builder.spawn(move || run(&worker))?;
        debug!(thread = %config.thread_name, "timer driver started");
        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
            config,
        })
    }

    /// Returns the process-wide driver, starting it on first use.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<TimerDriver> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Returns the configuration the driver was started with.
    #[must_use]
    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Schedules `callback` to run once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Shutdown`] once the driver has shut down; the
    /// callback is dropped without running.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> Result<TimerHandle, TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now()
            .checked_add(delay)
            .unwrap_or_else(far_future);
        self.schedule_at(deadline, callback)
    }

    /// Schedules `callback` to run at `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Shutdown`] once the driver has shut down.
    pub fn schedule_at<F>(&self, deadline: Instant, callback: F) -> Result<TimerHandle, TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            drop(state);
            debug!("timer driver is shut down; refusing timer");
            return Err(TimerError::Shutdown);
        }
        let generation = state.next_generation;
        state.next_generation += 1;
        let key = state.registrations.insert(Registration {
            generation,
            callback: Box::new(callback),
        });
        let wake = state.heap.peek().is_none_or(|top| deadline < top.deadline);
        state.heap.push(HeapEntry {
            deadline,
            key,
            generation,
        });
        drop(state);
        if wake {
            self.shared.condvar.notify_one();
        }
        trace!(key, generation, "timer scheduled");
        Ok(TimerHandle {
            shared: Arc::downgrade(&self.shared),
            key,
            generation,
        })
    }

    /// Returns the number of timers that are scheduled and have not fired.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().registrations.len()
    }

    /// Returns true if no timer is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    /// Returns the earliest scheduled deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared.state.lock().next_deadline()
    }

    /// Returns how many callbacks have fired so far.
    #[must_use]
    pub fn fired_count(&self) -> u64 {
        self.shared.fired.load(AtomicOrdering::Relaxed)
    }

    /// Stops the timer thread and drops every unfired timer.
    ///
    /// Idempotent. Called automatically on drop.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.heap.clear();
            std::mem::take(&mut state.registrations)
        };
        self.shared.condvar.notify_all();
        drop(dropped);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Shutting down from a callback; the loop exits on its own.
                return;
            }
            if handle.join().is_err() {
                warn!("timer thread panicked");
            }
            debug!(thread = %self.config.thread_name, "timer driver stopped");
        }
    }
}

impl Default for TimerDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TimerDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerDriver")
            .field("thread", &self.config.thread_name)
            .field("pending", &self.pending_count())
            .field("fired", &self.fired_count())
            .finish()
    }
}

fn far_future() -> Instant {
    // Roughly thirty years; far enough to never fire in practice.
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let expired = state.collect_expired(Instant::now());
        if !expired.is_empty() {
            MutexGuard::unlocked(&mut state, || fire(shared, expired));
            continue;
        }
        match state.next_deadline() {
            Some(deadline) => {
                shared.condvar.wait_until(&mut state, deadline);
            }
            None => shared.condvar.wait(&mut state),
        }
    }
}

fn fire(shared: &Shared, callbacks: Vec<TimerCallback>) {
    for callback in callbacks {
        shared.fired.fetch_add(1, AtomicOrdering::Relaxed);
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            warn!("timer callback panicked; ignoring");
        }
    }
}
