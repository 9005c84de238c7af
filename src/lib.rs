//! Promise/A+ deferred values for rust.
//!
//! A [`Promise`] is a single-assignment container for the eventual result of
//! some operation. Handlers registered with [`Promise::then`] and friends are
//! never called inline: every settlement and every handler invocation goes
//! through the per-thread task [`queue`], which the host drives with
//! [`queue::run_until_idle`], [`queue::turn`] or [`queue::block_on`].
//!
//! # Examples
//!
//! ```
//! use promise_aplus::{queue, Promise, Resolution};
//!
//! let promise: Promise<i32, String> = Promise::new(|resolver, _rejecter| {
//!     resolver.resolve(20);
//!     Ok(())
//! });
//! let doubled = promise.and_then(|v| Ok(Resolution::Value(v * 2)));
//!
//! assert_eq!(queue::block_on(doubled), Some(Ok(40)));
//! ```
pub mod combinators;
pub mod deferred;
pub mod promise;
pub mod queue;
pub mod resolution;

pub use combinators::{all, all_settled, any, race, Settled};
pub use deferred::Deferred;
pub use promise::{Executor, OnFulfilled, OnRejected, Outcome, Promise, PromiseState, Rejecter, Resolver};
pub use resolution::{Resolution, ThenFn, ThenMember, Thenable};

/// Every rejection reason a [`Promise`] can carry.
///
/// User supplied reasons are wrapped in [`Error::Rejected`]; the other
/// variants are produced by the library itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error<E> {
    #[error("executor must be a function")]
    InvalidExecutor,
    #[error("chaining cycle detected for promise")]
    ChainingCycle,
    /// Reasons of every input of [`any`], in input order.
    #[error("all promises were rejected")]
    Aggregate(Vec<Error<E>>),
    #[error("{0}")]
    Rejected(E),
}

impl<E> Error<E> {
    /// The user reason, if this is one.
    pub fn rejected(&self) -> Option<&E> {
        match self {
            Error::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn into_rejected(self) -> Option<E> {
        match self {
            Error::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    /// The aggregated reasons, if this came out of [`any`].
    pub fn reasons(&self) -> Option<&[Error<E>]> {
        match self {
            Error::Aggregate(reasons) => Some(reasons),
            _ => None,
        }
    }

    pub fn is_chaining_cycle(&self) -> bool {
        matches!(self, Error::ChainingCycle)
    }
}

impl<E> From<E> for Error<E> {
    fn from(reason: E) -> Self {
        Error::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
use super::Error;

#[test]
fn test_error_display() {
    assert_eq!(Error::<String>::InvalidExecutor.to_string(), "executor must be a function");
    assert_eq!(Error::<String>::ChainingCycle.to_string(), "chaining cycle detected for promise");
    assert_eq!(Error::<String>::Aggregate(vec![]).to_string(), "all promises were rejected");
    assert_eq!(Error::Rejected("💥".to_string()).to_string(), "💥");
}

#[test]
fn test_error_accessors() {
    let err: Error<i32> = 7.into();
    assert_eq!(err.rejected(), Some(&7));
    assert_eq!(err.clone().into_rejected(), Some(7));
    assert!(err.reasons().is_none());

    let agg = Error::Aggregate(vec![Error::Rejected(1), Error::ChainingCycle]);
    assert_eq!(agg.reasons().map(|r| r.len()), Some(2));
    assert!(agg.rejected().is_none());
    assert!(Error::<i32>::ChainingCycle.is_chaining_cycle());
}
}
