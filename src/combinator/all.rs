//! Wait-for-all aggregation.

use crate::promise::Promise;
use crate::tracing_compat::debug;
use crate::types::{CancelReason, ChildCancelMode};
use parking_lot::Mutex;
use std::sync::Arc;

struct AllState<T> {
    results: Vec<Option<T>>,
    remaining: usize,
    synchronous: bool,
}

/// Waits for every promise and fulfills with their values in input order.
///
/// - The first rejection rejects the aggregate (fail fast); the other inputs
///   keep running.
/// - Cancelling the aggregate cancels every input; cancelling any input
///   cancels the aggregate and so the other inputs.
/// - An empty input fulfills immediately with an empty vector.
/// - The aggregate completed synchronously only if every input did.
///
/// # Example
///
/// ```
/// use pledge::{all, Promise};
///
/// let sum = all([Promise::resolved(1), Promise::resolved(2)]).map(|v| v.iter().sum::<i32>());
/// assert_eq!(sum.wait().unwrap(), 3);
/// ```
pub fn all<T, I>(promises: I) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let inputs: Vec<Promise<T>> = promises.into_iter().collect();
    if inputs.is_empty() {
        return Promise::resolved(Vec::new());
    }

    let aggregate = Promise::<Vec<T>>::pending(ChildCancelMode::Any);
    let cancel_inputs: Vec<_> = inputs.iter().map(Promise::downgrade).collect();
    aggregate.register_on_cancel(move || {
        debug!(inputs = cancel_inputs.len(), "aggregate cancelled; cancelling inputs");
        for input in cancel_inputs.iter().filter_map(|input| input.upgrade()) {
            input.cancel_with(CancelReason::aggregate());
        }
    });

    let state = Arc::new(Mutex::new(AllState {
        results: vec![None; inputs.len()],
        remaining: inputs.len(),
        synchronous: true,
    }));

    for (index, input) in inputs.iter().enumerate() {
        let aggregate = aggregate.clone();
        let state = Arc::clone(&state);
        input.subscribe(move |outcome, synchronous| match outcome {
            Ok(value) => {
                let finished = {
                    let mut state = state.lock();
                    state.results[index] = Some(value.clone());
                    state.synchronous &= synchronous;
                    state.remaining -= 1;
                    if state.remaining == 0 {
                        let values: Vec<T> =
                            state.results.iter_mut().filter_map(Option::take).collect();
                        Some((values, state.synchronous))
                    } else {
                        None
                    }
                };
                if let Some((values, synchronous)) = finished {
                    aggregate.settle(Ok(values), synchronous);
                }
            }
            Err(error) => {
                aggregate.settle(Err(error.clone()), synchronous);
            }
        });
    }
    aggregate
}

/// Waits for two promises of different types.
///
/// Follows the same rules as [`all`].
pub fn join<A, B>(first: &Promise<A>, second: &Promise<B>) -> Promise<(A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    struct JoinState<A, B> {
        first: Option<A>,
        second: Option<B>,
        synchronous: bool,
    }

    impl<A, B> JoinState<A, B> {
        fn take_if_complete(&mut self) -> Option<((A, B), bool)> {
            if self.first.is_some() && self.second.is_some() {
                let a = self.first.take()?;
                let b = self.second.take()?;
                Some(((a, b), self.synchronous))
            } else {
                None
            }
        }
    }

    let aggregate = Promise::<(A, B)>::pending(ChildCancelMode::Any);
    {
        let first = first.downgrade();
        let second = second.downgrade();
        aggregate.register_on_cancel(move || {
            if let Some(first) = first.upgrade() {
                first.cancel_with(CancelReason::aggregate());
            }
            if let Some(second) = second.upgrade() {
                second.cancel_with(CancelReason::aggregate());
            }
        });
    }

    let state = Arc::new(Mutex::new(JoinState {
        first: None,
        second: None,
        synchronous: true,
    }));

    {
        let aggregate = aggregate.clone();
        let state = Arc::clone(&state);
        first.subscribe(move |outcome, synchronous| match outcome {
            Ok(value) => {
                let finished = {
                    let mut state = state.lock();
                    state.first = Some(value.clone());
                    state.synchronous &= synchronous;
                    state.take_if_complete()
                };
                if let Some((pair, synchronous)) = finished {
                    aggregate.settle(Ok(pair), synchronous);
                }
            }
            Err(error) => {
                aggregate.settle(Err(error.clone()), synchronous);
            }
        });
    }
    {
        let aggregate = aggregate.clone();
        second.subscribe(move |outcome, synchronous| match outcome {
            Ok(value) => {
                let finished = {
                    let mut state = state.lock();
                    state.second = Some(value.clone());
                    state.synchronous &= synchronous;
                    state.take_if_complete()
                };
                if let Some((pair, synchronous)) = finished {
                    aggregate.settle(Ok(pair), synchronous);
                }
            }
            Err(error) => {
                aggregate.settle(Err(error.clone()), synchronous);
            }
        });
    }
    aggregate
}
