//! First-to-settle selection.

use crate::promise::Promise;
use crate::types::ChildCancelMode;

/// Settles with the outcome of the first promise to settle.
///
/// Losers are left running; they are not cancelled. Cancelling the race
/// result does not touch the inputs either. An empty input never settles.
///
/// When several inputs are already settled, the earliest in input order
/// wins.
pub fn race<T, I>(promises: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let winner = Promise::<T>::pending(ChildCancelMode::All);
    for input in promises {
        let winner = winner.clone();
        input.subscribe(move |outcome, synchronous| {
            winner.settle(outcome.clone(), synchronous);
        });
    }
    winner
}
