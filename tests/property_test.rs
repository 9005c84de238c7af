//! Property-based tests for value pass-through, exactly-once settlement and
//! combinator alignment, using proptest.

use promise_aplus::{all, all_settled, queue, race, Error, Promise, PromiseState, Resolution, Settled};
use proptest::prelude::*;
use std::{cell::RefCell, rc::Rc, time::Duration};

#[derive(Debug, Clone)]
enum Call {
    Resolve(i64),
    Reject(i64),
}

fn arb_call() -> impl Strategy<Value = Call> {
    prop_oneof![any::<i64>().prop_map(Call::Resolve), any::<i64>().prop_map(Call::Reject),]
}

/// An input of a combinator: settles after `delay` ms, fulfilled or not.
fn arb_input() -> impl Strategy<Value = (u64, bool, i64)> {
    (0u64..50, any::<bool>(), any::<i64>())
}

fn make(delay: u64, fulfil: bool, value: i64) -> Promise<i64, i64> {
    if fulfil {
        Promise::resolve_after(Duration::from_millis(delay), value)
    } else {
        Promise::reject_after(Duration::from_millis(delay), value)
    }
}

fn settle<T: Clone + 'static>(promise: &Promise<T, i64>) -> PromiseState<T, i64> {
    queue::run_until_idle();
    promise.state()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Plain values fulfill unchanged, through any number of pass-through links.
    #[test]
    fn plain_value_passes_through(value in any::<i64>(), links in 0usize..8) {
        queue::reset();
        let mut promise: Promise<i64, i64> = Promise::resolve_with(Resolution::Value(value));
        for _ in 0..links {
            promise = promise.then_with(None, None);
        }
        prop_assert_eq!(settle(&promise), PromiseState::Fulfilled(value));
    }

    /// Only the first capability call is observed.
    #[test]
    fn first_settle_call_wins(calls in prop::collection::vec(arb_call(), 1..6)) {
        queue::reset();
        let script = calls.clone();
        let promise: Promise<i64, i64> = Promise::new(move |resolver, rejecter| {
            for call in script {
                match call {
                    Call::Resolve(v) => resolver.resolve(v),
                    Call::Reject(r) => rejecter.reject(r),
                }
            }
            Ok(())
        });
        let expected = match calls[0] {
            Call::Resolve(v) => PromiseState::Fulfilled(v),
            Call::Reject(r) => PromiseState::Rejected(Error::Rejected(r)),
        };
        prop_assert_eq!(settle(&promise), expected);
    }

    /// Handlers fire once each, in registration order.
    #[test]
    fn handlers_fire_once_in_order(count in 1usize..16, value in any::<i64>()) {
        queue::reset();
        let deferred = Promise::<i64, i64>::deferred();
        let log = Rc::new(RefCell::new(vec![]));
        for index in 0..count {
            let log = log.clone();
            deferred.promise.map(move |v| log.borrow_mut().push((index, v)));
        }
        deferred.resolve(value);
        deferred.resolve(value.wrapping_add(1));
        queue::run_until_idle();
        let expected: Vec<_> = (0..count).map(|index| (index, value)).collect();
        prop_assert_eq!(log.borrow().clone(), expected);
    }

    /// all_settled keeps index alignment and status tags.
    #[test]
    fn all_settled_is_index_aligned(inputs in prop::collection::vec(arb_input(), 0..10)) {
        queue::reset();
        let promises: Vec<_> = inputs.iter().map(|&(d, f, v)| make(d, f, v)).collect();
        let settled: Promise<Vec<Settled<i64, i64>>, i64> = all_settled(promises);
        let expected: Vec<Settled<i64, i64>> = inputs
            .iter()
            .map(|&(_, fulfil, value)| {
                if fulfil {
                    Settled::Fulfilled { value }
                } else {
                    Settled::Rejected { reason: Error::Rejected(value) }
                }
            })
            .collect();
        prop_assert_eq!(settle(&settled), PromiseState::Fulfilled(expected));
    }

    /// all fulfills with every value, or rejects with the earliest rejection.
    #[test]
    fn all_matches_earliest_rejection(inputs in prop::collection::vec(arb_input(), 1..10)) {
        queue::reset();
        let promises: Vec<_> = inputs.iter().map(|&(d, f, v)| make(d, f, v)).collect();
        let joined: Promise<Vec<i64>, i64> = all(promises);
        // ties on the delay go to the earlier input, like timer registration order
        let earliest_rejection = inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| !input.1)
            .min_by_key(|&(index, &(delay, _, _))| (delay, index))
            .map(|(_, &(_, _, value))| value);
        let expected = match earliest_rejection {
            Some(reason) => PromiseState::Rejected(Error::Rejected(reason)),
            None => PromiseState::Fulfilled(inputs.iter().map(|&(_, _, v)| v).collect::<Vec<_>>()),
        };
        prop_assert_eq!(settle(&joined), expected);
    }

    /// race settles like the input with the smallest delay.
    #[test]
    fn race_matches_earliest_input(inputs in prop::collection::vec(arb_input(), 1..10)) {
        queue::reset();
        let promises: Vec<_> = inputs.iter().map(|&(d, f, v)| make(d, f, v)).collect();
        let winner: Promise<i64, i64> = race(promises);
        let (_, &(_, fulfil, value)) = inputs
            .iter()
            .enumerate()
            .min_by_key(|&(index, &(delay, _, _))| (delay, index))
            .expect("at least one input");
        let expected = if fulfil {
            PromiseState::Fulfilled(value)
        } else {
            PromiseState::Rejected(Error::Rejected(value))
        };
        prop_assert_eq!(settle(&winner), expected);
    }
}
