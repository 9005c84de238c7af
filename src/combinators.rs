//! Combinators over collections of promises: [`all`], [`all_settled`],
//! [`any`] and [`race`].
//!
//! Every input is first normalized into a promise through the resolution
//! procedure, so plain values, promises and thenables can be mixed (see
//! [`Resolution`]). Outputs are index aligned with the inputs.
use std::cell::RefCell;
use std::rc::Rc;

use crate::deferred::Deferred;
use crate::promise::Promise;
use crate::resolution::Resolution;
use crate::Error;

/// The outcome of one input of [`all_settled`].
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T, E> {
    Fulfilled { value: T },
    Rejected { reason: Error<E> },
}

impl<T, E> Settled<T, E> {
    /// `"fulfilled"` or `"rejected"`.
    pub fn status(&self) -> &'static str {
        match self {
            Settled::Fulfilled { .. } => "fulfilled",
            Settled::Rejected { .. } => "rejected",
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Settled::Fulfilled { value } => Some(value),
            Settled::Rejected { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&Error<E>> {
        match self {
            Settled::Fulfilled { .. } => None,
            Settled::Rejected { reason } => Some(reason),
        }
    }
}

impl<T, E> From<Result<T, Error<E>>> for Settled<T, E> {
    fn from(outcome: Result<T, Error<E>>) -> Self {
        match outcome {
            Ok(value) => Settled::Fulfilled { value },
            Err(reason) => Settled::Rejected { reason },
        }
    }
}

fn normalize<T, E, I>(inputs: I) -> Vec<Promise<T, E>>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    inputs
        .into_iter()
        .map(|input| Promise::resolve_with(input.into()))
        .collect()
}

/// Slots filled in as inputs settle, one per input.
struct Gather<S> {
    slots: Vec<Option<S>>,
    remaining: usize,
}

impl<S> Gather<S> {
    fn new(len: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }))
    }

    /// Stores the entry for `index`; hands back every entry once the last
    /// one arrived.
    fn fill(&mut self, index: usize, entry: S) -> Option<Vec<S>> {
        if self.slots[index].replace(entry).is_none() {
            self.remaining -= 1;
        }
        if self.remaining > 0 {
            return None;
        }
        Some(self.slots.iter_mut().filter_map(Option::take).collect())
    }
}

/// Fulfills with every value once all inputs fulfilled, or rejects with the
/// first rejection.
///
/// Values that show up after a rejection are not collected. An empty input
/// fulfills with an empty vector.
///
/// # Examples
///
/// ```
/// use promise_aplus::{all, queue, Promise, Resolution};
/// use std::time::Duration;
///
/// let inputs = vec![
///     Promise::<i32, ()>::resolve_after(Duration::from_millis(100), 1).into(),
///     Resolution::Value(2),
///     Promise::<i32, ()>::resolve(3).into(),
/// ];
/// let joined: Promise<Vec<i32>, ()> = all(inputs);
/// assert_eq!(queue::block_on(joined), Some(Ok(vec![1, 2, 3])));
/// ```
pub fn all<T, E, I>(inputs: I) -> Promise<Vec<T>, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let inputs = normalize(inputs);
    let deferred = Deferred::new();
    if inputs.is_empty() {
        deferred.resolve(Vec::new());
        return deferred.promise;
    }
    let gather = Gather::new(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let gather = gather.clone();
        let (resolver, rejecter) = (deferred.resolver.clone(), deferred.rejecter.clone());
        input.subscribe(move |outcome| match outcome {
            Ok(value) => {
                if resolver.is_done() {
                    return;
                }
                let values = gather.borrow_mut().fill(index, value);
                if let Some(values) = values {
                    resolver.resolve(values);
                }
            }
            Err(reason) => rejecter.reject_with(reason),
        });
    }
    deferred.promise
}

/// Fulfills with the outcome of every input once all of them settled.
/// Never rejects.
pub fn all_settled<T, E, I>(inputs: I) -> Promise<Vec<Settled<T, E>>, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let inputs = normalize(inputs);
    let deferred = Deferred::new();
    if inputs.is_empty() {
        deferred.resolve(Vec::new());
        return deferred.promise;
    }
    let gather = Gather::new(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let gather = gather.clone();
        let resolver = deferred.resolver.clone();
        input.subscribe(move |outcome| {
            let entries = gather.borrow_mut().fill(index, Settled::from(outcome));
            if let Some(entries) = entries {
                resolver.resolve(entries);
            }
        });
    }
    deferred.promise
}

/// Fulfills with the first value, or rejects with [`Error::Aggregate`] of
/// every reason once all inputs rejected. An empty input rejects right away
/// with an empty aggregate.
pub fn any<T, E, I>(inputs: I) -> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let inputs = normalize(inputs);
    let deferred = Deferred::new();
    if inputs.is_empty() {
        deferred.rejecter.reject_with(Error::Aggregate(Vec::new()));
        return deferred.promise;
    }
    let gather = Gather::new(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let gather = gather.clone();
        let (resolver, rejecter) = (deferred.resolver.clone(), deferred.rejecter.clone());
        input.subscribe(move |outcome| match outcome {
            Ok(value) => resolver.resolve(value),
            Err(reason) => {
                let reasons = gather.borrow_mut().fill(index, reason);
                if let Some(reasons) = reasons {
                    rejecter.reject_with(Error::Aggregate(reasons));
                }
            }
        });
    }
    deferred.promise
}

/// Settles like whichever input settles first. An empty input never
/// settles.
pub fn race<T, E, I>(inputs: I) -> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let deferred = Deferred::new();
    for input in normalize(inputs) {
        let (resolver, rejecter) = (deferred.resolver.clone(), deferred.rejecter.clone());
        input.subscribe(move |outcome| match outcome {
            Ok(value) => resolver.resolve(value),
            Err(reason) => rejecter.reject_with(reason),
        });
    }
    deferred.promise
}

#[cfg(test)]
mod tests {
use super::*;

#[test]
fn test_gather_hands_back_in_index_order() {
    let gather = Gather::new(3);
    let mut gather = gather.borrow_mut();
    assert_eq!(gather.fill(2, "c"), None);
    assert_eq!(gather.fill(0, "a"), None);
    assert_eq!(gather.fill(1, "b"), Some(vec!["a", "b", "c"]));
}

#[test]
fn test_gather_counts_each_slot_once() {
    let gather = Gather::new(2);
    let mut gather = gather.borrow_mut();
    assert_eq!(gather.fill(0, 1), None);
    assert_eq!(gather.fill(0, 2), None);
    assert_eq!(gather.fill(1, 3), Some(vec![2, 3]));
}

#[test]
fn test_settled_accessors() {
    let ok: Settled<i32, &str> = Ok(1).into();
    assert_eq!(ok.status(), "fulfilled");
    assert_eq!(ok.value(), Some(&1));
    assert!(ok.reason().is_none());

    let err: Settled<i32, &str> = Err(Error::Rejected("no")).into();
    assert_eq!(err.status(), "rejected");
    assert!(!err.is_fulfilled());
    assert_eq!(err.reason(), Some(&Error::Rejected("no")));
}
}
