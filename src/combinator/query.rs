//! Query-style helpers: filtering, pairing and keyed joins.
//!
//! A value that does not pass a filter (or a join whose keys differ) is not
//! an error: the derived promise is *cancelled* with
//! [`CancelKind::Filtered`](crate::CancelKind::Filtered), so downstream
//! `catch` handlers skip it and `finally` still runs.

use super::all::join;
use crate::error::PromiseError;
use crate::promise::{Promise, capture};
use crate::types::CancelReason;

impl<T: Clone + Send + 'static> Promise<T> {
    /// Passes the value through if `predicate` holds, otherwise cancels.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: FnOnce(&T) -> bool + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Ok(value) => capture(move || {
                if predicate(value) {
                    Ok(value.clone())
                } else {
                    Err(PromiseError::cancelled(CancelReason::filtered()))
                }
            }),
            Err(error) => Err(error.clone()),
        })
    }

    /// Pairs this promise's value with `other`'s.
    ///
    /// See [`join`](crate::combinator::join).
    pub fn zip<U>(&self, other: &Promise<U>) -> Promise<(T, U)>
    where
        U: Clone + Send + 'static,
    {
        join(self, other)
    }

    /// Combines two values whose keys match; cancels when they differ.
    pub fn join_on<U, K, R, KA, KB, C>(
        &self,
        other: &Promise<U>,
        key_of: KA,
        other_key_of: KB,
        combine: C,
    ) -> Promise<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        K: PartialEq,
        KA: FnOnce(&T) -> K + Send + 'static,
        KB: FnOnce(&U) -> K + Send + 'static,
        C: FnOnce(T, U) -> R + Send + 'static,
    {
        self.zip(other).then(move |(left, right)| {
            if key_of(&left) == other_key_of(&right) {
                Ok(combine(left, right))
            } else {
                Err(PromiseError::cancelled(
                    CancelReason::filtered().with_message("join keys differ"),
                ))
            }
        })
    }
}
