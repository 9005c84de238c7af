//! The resolution procedure: how a settlement candidate settles a promise.
//!
//! A candidate is one of three things, picked explicitly by the caller
//! through [`Resolution`]:
//!
//! * a plain value, which fulfills the promise as is;
//! * another [`Promise`] of the same kind, whose eventual state is adopted;
//! * a foreign [`Thenable`], whose `then` member is read once and invoked
//!   with a fresh pair of capabilities.
//!
//! A promise can never adopt itself; trying to rejects it with
//! [`Error::ChainingCycle`].
use std::fmt::{self, Debug};

use tracing::debug;

use crate::promise::{Promise, Rejecter, Resolver};
use crate::Error;

/// A type erased `then` member: gets the two settle capabilities of the
/// promise being resolved. Returning `Err` before either capability was
/// used rejects that promise; afterwards the error is dropped.
pub type ThenFn<T, E> = Box<dyn FnOnce(Resolver<T, E>, Rejecter<T, E>) -> Result<(), Error<E>>>;

/// What reading the `then` member of a [`Thenable`] produced.
pub enum ThenMember<T, E> {
    Callable(ThenFn<T, E>),
    /// The member is there but cannot be called; the thenable settles as
    /// this plain value.
    NotCallable(T),
}

/// A foreign future-like value that opts in to assimilation.
///
/// # Examples
///
/// ```
/// use promise_aplus::{queue, Error, Promise, Resolution, ThenMember, Thenable};
///
/// struct Five;
///
/// impl Thenable<i32, ()> for Five {
///     fn then_member(&self) -> Result<ThenMember<i32, ()>, Error<()>> {
///         Ok(ThenMember::Callable(Box::new(|resolver, _rejecter| {
///             resolver.resolve(5);
///             Ok(())
///         })))
///     }
/// }
///
/// let promise: Promise<i32, ()> = Promise::resolve_with(Resolution::thenable(Five));
/// assert_eq!(queue::block_on(promise), Some(Ok(5)));
/// ```
pub trait Thenable<T, E> {
    /// Reads the `then` member. Called at most once per resolution.
    fn then_member(&self) -> Result<ThenMember<T, E>, Error<E>>;
}

/// A settlement candidate.
pub enum Resolution<T, E> {
    Value(T),
    Promise(Promise<T, E>),
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn thenable(thenable: impl Thenable<T, E> + 'static) -> Self {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T: Debug, E: Debug> Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

impl<T, E> Debug for ThenMember<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThenMember::Callable(_) => f.write_str("Callable(..)"),
            ThenMember::NotCallable(_) => f.write_str("NotCallable(..)"),
        }
    }
}

/// Settles `promise` according to `candidate`.
pub(crate) fn resolve_promise<T, E>(promise: &Promise<T, E>, candidate: Resolution<T, E>)
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    match candidate {
        Resolution::Value(value) => promise.settle(Ok(value)),
        Resolution::Promise(other) => adopt(promise, other),
        Resolution::Thenable(thenable) => assimilate(promise, thenable.as_ref()),
    }
}

fn adopt<T, E>(promise: &Promise<T, E>, other: Promise<T, E>)
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    if other.ptr_eq(promise) {
        debug!("promise resolved with itself");
        promise.settle(Err(Error::ChainingCycle));
        return;
    }
    // already settled: no need to wait another turn for a reaction
    if let Some(outcome) = other.outcome() {
        promise.settle(outcome);
        return;
    }
    let target = promise.clone();
    other.subscribe(move |outcome| target.settle(outcome));
}

fn assimilate<T, E>(promise: &Promise<T, E>, thenable: &dyn Thenable<T, E>)
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    match thenable.then_member() {
        Err(reason) => {
            debug!("reading then member failed");
            promise.settle(Err(reason));
        }
        Ok(ThenMember::NotCallable(value)) => promise.settle(Ok(value)),
        Ok(ThenMember::Callable(then)) => {
            let (resolver, rejecter) = promise.capabilities();
            if let Err(reason) = then(resolver, rejecter.clone()) {
                if rejecter.is_done() {
                    debug!("then raised after settling, ignored");
                }
                rejecter.reject_with(reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
use super::*;
use crate::{queue, PromiseState};

struct NotCallable(i32);

impl Thenable<i32, String> for NotCallable {
    fn then_member(&self) -> Result<ThenMember<i32, String>, Error<String>> {
        Ok(ThenMember::NotCallable(self.0))
    }
}

struct Throws;

impl Thenable<i32, String> for Throws {
    fn then_member(&self) -> Result<ThenMember<i32, String>, Error<String>> {
        Err("getter".to_string().into())
    }
}

#[test]
fn test_self_resolution_is_a_cycle() {
    let promise: Promise<i32, String> = Promise::pending();
    resolve_promise(&promise, promise.clone().into());
    queue::run_until_idle();
    assert_eq!(promise.state(), PromiseState::Rejected(Error::ChainingCycle));
}

#[test]
fn test_adopts_settled_promise_without_extra_turn() {
    let source: Promise<i32, String> = Promise::resolve(8);
    queue::run_until_idle();

    let promise: Promise<i32, String> = Promise::pending();
    resolve_promise(&promise, source.into());
    assert_eq!(queue::turn().tasks_run, 1);
    assert_eq!(promise.state(), PromiseState::Fulfilled(8));
}

#[test]
fn test_adopts_pending_promise_later() {
    let source: Promise<i32, String> = Promise::pending();
    let promise: Promise<i32, String> = Promise::pending();
    resolve_promise(&promise, source.clone().into());
    queue::run_until_idle();
    assert!(promise.is_pending());

    source.settle(Err("late".to_string().into()));
    queue::run_until_idle();
    assert_eq!(promise.state(), PromiseState::Rejected(Error::Rejected("late".to_string())));
}

#[test]
fn test_not_callable_then_fulfills_with_value() {
    let promise: Promise<i32, String> = Promise::resolve_with(Resolution::thenable(NotCallable(3)));
    queue::run_until_idle();
    assert_eq!(promise.state(), PromiseState::Fulfilled(3));
}

#[test]
fn test_failing_then_read_rejects() {
    let promise: Promise<i32, String> = Promise::resolve_with(Resolution::thenable(Throws));
    queue::run_until_idle();
    assert_eq!(promise.state(), PromiseState::Rejected(Error::Rejected("getter".to_string())));
}

#[test]
fn test_resolution_debug() {
    let value: Resolution<i32, ()> = Resolution::Value(1);
    assert_eq!(format!("{value:?}"), "Value(1)");
    let thenable: Resolution<i32, String> = Resolution::thenable(Throws);
    assert_eq!(format!("{thenable:?}"), "Thenable(..)");
}
}
