#![allow(missing_docs)]

//! Combinator integration tests: aggregation, racing, timers and the
//! query-style helpers working together on real threads.

#[macro_use]
mod common;

use common::{deferred, init_test, wait_until};
use pledge::{
    CancelKind, CancelReason, Promise, PromiseError, PromiseState, TimeoutError, TimerConfig,
    TimerDriver, TimerError, all, delay_on, join, race, try_promise, try_with,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn driver() -> TimerDriver {
    TimerDriver::with_config(TimerConfig::default().thread_name("pledge-test-timer"))
        .expect("timer thread spawns")
}

#[test]
fn all_collects_values_from_worker_threads_in_input_order() {
    init_test("all_collects_values_from_worker_threads_in_input_order");
    let pending: Vec<_> = (0..8).map(|_| deferred::<usize>()).collect();
    let aggregate = all(pending.iter().map(|(promise, _)| promise.clone()));

    let workers: Vec<_> = pending
        .into_iter()
        .enumerate()
        .rev()
        .map(|(index, (_, resolver))| thread::spawn(move || resolver.resolve(index * 10)))
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    assert_eq!(
        aggregate.wait().expect("fulfilled"),
        vec![0, 10, 20, 30, 40, 50, 60, 70]
    );
    assert!(!aggregate.completed_synchronously());
    test_complete!("all_collects_values_from_worker_threads_in_input_order");
}

#[test]
fn all_fails_fast_without_cancelling_siblings() {
    init_test("all_fails_fast_without_cancelling_siblings");
    let (a, ra) = deferred::<i32>();
    let (b, rb) = deferred::<i32>();
    let aggregate = all([a.clone(), b.clone()]);

    rb.reject("second failed");
    assert_eq!(aggregate.state(), PromiseState::Rejected);
    assert_eq!(a.state(), PromiseState::Pending);
    assert!(ra.resolve(1));
    test_complete!("all_fails_fast_without_cancelling_siblings");
}

#[test]
fn cancelling_all_cancels_every_input() {
    init_test("cancelling_all_cancels_every_input");
    let (a, _ra) = deferred::<i32>();
    let (b, _rb) = deferred::<i32>();
    let aggregate = all([a.clone(), b.clone()]);

    assert!(aggregate.cancel());
    for input in [&a, &b] {
        let error = input.wait().expect_err("cancelled");
        assert_eq!(
            error.cancel_reason().map(CancelReason::kind),
            Some(CancelKind::Aggregate)
        );
    }
    test_complete!("cancelling_all_cancels_every_input");
}

#[test]
fn join_pairs_heterogeneous_values() {
    init_test("join_pairs_heterogeneous_values");
    let (count, resolver) = deferred::<u8>();
    let pair = join(&count, &Promise::resolved("label"));
    resolver.resolve(4);
    assert_eq!(pair.wait().expect("fulfilled"), (4, "label"));
    test_complete!("join_pairs_heterogeneous_values");
}

#[test]
fn race_between_delays_picks_the_shorter() {
    init_test("race_between_delays_picks_the_shorter");
    let timers = driver();
    let slow = delay_on(&timers, Duration::from_secs(5)).map(|()| "slow");
    let fast = delay_on(&timers, Duration::from_millis(10)).map(|()| "fast");
    let winner = race([slow.clone(), fast]);

    assert_eq!(winner.wait().expect("fulfilled"), "fast");
    assert!(!winner.completed_synchronously());
    assert_eq!(slow.state(), PromiseState::Pending);
    test_complete!("race_between_delays_picks_the_shorter");
}

#[test]
fn delay_elapses_no_earlier_than_requested() {
    init_test("delay_elapses_no_earlier_than_requested");
    let timers = driver();
    let started = Instant::now();
    delay_on(&timers, Duration::from_millis(25))
        .wait()
        .expect("fulfilled");
    assert!(started.elapsed() >= Duration::from_millis(25));
    test_complete!("delay_elapses_no_earlier_than_requested");
}

#[test]
fn cancelled_delay_releases_its_timer() {
    init_test("cancelled_delay_releases_its_timer");
    let timers = driver();
    let sleeping = delay_on(&timers, Duration::from_secs(30));
    assert_eq!(timers.pending_count(), 1);
    assert!(sleeping.cancel());
    assert!(timers.is_empty());
    test_complete!("cancelled_delay_releases_its_timer");
}

#[test]
fn timeout_rejects_and_cancels_a_stalled_source() {
    init_test("timeout_rejects_and_cancels_a_stalled_source");
    let timers = driver();
    let (source, _resolver) = deferred::<i32>();
    let limited = source.timeout_on(&timers, Duration::from_millis(10));

    let error = limited.wait().expect_err("timed out");
    assert_eq!(
        error.downcast_ref::<TimeoutError>().map(|e| e.after),
        Some(Duration::from_millis(10))
    );
    let error = source.wait().expect_err("source cancelled");
    assert_eq!(
        error.cancel_reason().map(CancelReason::kind),
        Some(CancelKind::Timeout)
    );
    test_complete!("timeout_rejects_and_cancels_a_stalled_source");
}

#[test]
fn timeout_on_a_long_delay_cleans_up_the_delay_once() {
    init_test("timeout_on_a_long_delay_cleans_up_the_delay_once");
    let timers = driver();
    let sleeping = delay_on(&timers, Duration::from_secs(1));
    let cleanups = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cleanups);
    sleeping.on_cancelled(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let limited = sleeping.timeout_on(&timers, Duration::from_millis(100));
    assert_eq!(timers.pending_count(), 2);

    let error = limited.wait().expect_err("timed out");
    assert!(error.is_timeout());
    let error = sleeping.wait().expect_err("delay cancelled");
    assert_eq!(sleeping.state(), PromiseState::Cancelled);
    assert_eq!(
        error.cancel_reason().map(CancelReason::kind),
        Some(CancelKind::Timeout)
    );
    assert!(wait_until(Duration::from_secs(1), || timers.pending_count() == 0));
    assert_eq!(timers.fired_count(), 1, "only the deadline fired");
    assert!(wait_until(Duration::from_secs(1), || cleanups.load(Ordering::SeqCst) > 0));
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    test_complete!("timeout_on_a_long_delay_cleans_up_the_delay_once");
}

#[test]
fn stopped_driver_rejects_new_delays_and_deadlines() {
    init_test("stopped_driver_rejects_new_delays_and_deadlines");
    let timers = driver();
    timers.shutdown();

    let sleeping = delay_on(&timers, Duration::from_millis(1));
    let error = sleeping.wait().expect_err("refused");
    assert_eq!(error.downcast_ref::<TimerError>(), Some(&TimerError::Shutdown));

    let (source, resolver) = deferred::<i32>();
    let limited = source.timeout_on(&timers, Duration::from_millis(1));
    let error = limited.wait().expect_err("refused");
    assert_eq!(error.downcast_ref::<TimerError>(), Some(&TimerError::Shutdown));
    resolver.resolve(3);
    assert_eq!(source.wait().expect("source unaffected"), 3);
    test_complete!("stopped_driver_rejects_new_delays_and_deadlines");
}

#[test]
fn timeout_passes_through_a_prompt_source() {
    init_test("timeout_passes_through_a_prompt_source");
    let timers = driver();
    let (source, resolver) = deferred::<i32>();
    let limited = source.timeout_on(&timers, Duration::from_secs(30));
    resolver.resolve(11);
    assert_eq!(limited.wait().expect("fulfilled"), 11);
    assert!(wait_until(Duration::from_secs(1), || timers.is_empty()));
    test_complete!("timeout_passes_through_a_prompt_source");
}

#[test]
fn timeout_error_is_catchable() {
    init_test("timeout_error_is_catchable");
    let timers = driver();
    let (source, _resolver) = deferred::<&str>();
    let fallback = source
        .timeout_on(&timers, Duration::from_millis(5))
        .catch_as::<TimeoutError, _>(|_| Ok("fallback"));
    assert_eq!(fallback.wait().expect("recovered"), "fallback");
    test_complete!("timeout_error_is_catchable");
}

#[test]
fn try_with_and_try_promise_capture_failures() {
    init_test("try_with_and_try_promise_capture_failures");
    let ok = try_with(|| Ok::<_, PromiseError>(3));
    assert_eq!(ok.wait().ok(), Some(3));

    let failed = try_with(|| "x".parse::<i32>().map_err(|e| PromiseError::msg(e.to_string())));
    assert_eq!(failed.state(), PromiseState::Rejected);

    let panicked = try_promise::<i32, _>(|| panic!("no promise for you"));
    assert_eq!(panicked.state(), PromiseState::Rejected);

    let (inner, resolver) = deferred::<i32>();
    let adopted = try_promise(move || inner);
    resolver.resolve(8);
    assert_eq!(adopted.wait().ok(), Some(8));
    test_complete!("try_with_and_try_promise_capture_failures");
}

#[test]
fn filter_and_join_on_cancel_on_mismatch() {
    init_test("filter_and_join_on_cancel_on_mismatch");
    let even = Promise::resolved(4).filter(|v| v % 2 == 0);
    assert_eq!(even.wait().ok(), Some(4));

    let odd = Promise::resolved(3).filter(|v| v % 2 == 0);
    assert_eq!(odd.state(), PromiseState::Cancelled);

    let user = Promise::resolved((1_u32, "ada"));
    let order = Promise::resolved((1_u32, 250_u64));
    let matched = user.join_on(&order, |u| u.0, |o| o.0, |u, o| (u.1, o.1));
    assert_eq!(matched.wait().ok(), Some(("ada", 250)));

    let other_order = Promise::resolved((2_u32, 99_u64));
    let mismatched = user.join_on(&other_order, |u| u.0, |o| o.0, |u, o| (u.1, o.1));
    let error = mismatched.wait().expect_err("cancelled");
    assert_eq!(
        error.cancel_reason().map(CancelReason::kind),
        Some(CancelKind::Filtered)
    );
    test_complete!("filter_and_join_on_cancel_on_mismatch");
}

#[test]
fn global_delay_fires_from_the_shared_timer_thread() {
    init_test("global_delay_fires_from_the_shared_timer_thread");
    let fired = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&fired);
    let done = pledge::delay(Duration::from_millis(5)).map(move |()| {
        observed.store(true, Ordering::SeqCst);
    });
    done.wait().expect("fulfilled");
    assert!(fired.load(Ordering::SeqCst));
    test_complete!("global_delay_fires_from_the_shared_timer_thread");
}
