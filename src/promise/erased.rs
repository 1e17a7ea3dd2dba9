//! Type-erased promises for dynamic dispatch boundaries.
//!
//! Code that routes promises through heterogeneous handlers can erase the
//! value type with [`Promise::erase`] and recover it later with
//! [`AnyPromise::coerce`]. A coercion to the wrong type rejects with
//! [`PromiseError::InvalidCast`].

use super::Promise;
use crate::error::{CastError, PromiseError};
use std::any::Any;
use std::sync::Arc;

/// A shared, type-erased promise value.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// A promise whose value type has been erased.
pub type AnyPromise = Promise<AnyValue>;

impl<T: Clone + Send + Sync + 'static> Promise<T> {
    /// Erases the value type.
    ///
    /// The erased promise is a child: cancelling it follows the usual tree
    /// rules.
    pub fn erase(&self) -> AnyPromise {
        self.map(|value| Arc::new(value) as AnyValue)
    }
}

impl Promise<AnyValue> {
    /// Recovers a typed promise from an erased one.
    ///
    /// Rejects with [`PromiseError::InvalidCast`] when the value is not an
    /// `R`. Rejections pass through unchanged.
    pub fn coerce<R: Clone + Send + 'static>(&self) -> Promise<R> {
        self.then(|value: AnyValue| {
            (*value)
                .downcast_ref::<R>()
                .cloned()
                .ok_or_else(|| PromiseError::from(CastError::to::<R>()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::init_test_logging;
    use crate::types::{CancelReason, PromiseState};

    fn init_test(test_name: &str) {
        init_test_logging();
        crate::test_phase!(test_name);
    }

    #[test]
    fn erase_then_coerce_round_trips() {
        init_test("erase_then_coerce_round_trips");
        let erased = Promise::resolved(String::from("payload")).erase();
        let typed: Promise<String> = erased.coerce();
        assert_eq!(typed.wait().ok().as_deref(), Some("payload"));
        crate::test_complete!("erase_then_coerce_round_trips");
    }

    #[test]
    fn coerce_mismatch_is_invalid_cast() {
        init_test("coerce_mismatch_is_invalid_cast");
        let typed = Promise::resolved(5_u32).erase().coerce::<String>();
        let error = typed.wait().expect_err("mismatch");
        crate::assert_with_log!(
            error.kind() == ErrorKind::InvalidCast,
            "coercion mismatch",
            ErrorKind::InvalidCast,
            error.kind()
        );
        assert!(error.to_string().contains("String"));
        crate::test_complete!("coerce_mismatch_is_invalid_cast");
    }

    #[test]
    fn cancelling_erased_cancels_source() {
        init_test("cancelling_erased_cancels_source");
        let source = Promise::<i32>::new(|_| {});
        let erased = source.erase();
        erased.cancel_with(CancelReason::user("dispatcher gave up"));
        assert_eq!(source.state(), PromiseState::Cancelled);
        crate::test_complete!("cancelling_erased_cancels_source");
    }
}
