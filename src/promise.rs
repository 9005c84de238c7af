use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tracing::trace;

use crate::deferred::Deferred;
use crate::resolution::{resolve_promise, Resolution};
use crate::{queue, Error};

/// What a handler hands back: a settlement candidate, or a raised reason.
pub type Outcome<U, E> = Result<Resolution<U, E>, Error<E>>;

pub type OnFulfilled<T, U, E> = Box<dyn FnOnce(T) -> Outcome<U, E>>;

pub type OnRejected<U, E> = Box<dyn FnOnce(Error<E>) -> Outcome<U, E>>;

/// A setup routine that has been type erased, see [`Promise::try_new`].
pub type Executor<T, E> = Box<dyn FnOnce(Resolver<T, E>, Rejecter<T, E>) -> Result<(), Error<E>>>;

pub(crate) type Reaction<T, E> = Box<dyn FnOnce(Result<T, Error<E>>)>;

#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(Error<E>),
}

impl<T, E> PromiseState<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, PromiseState::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, PromiseState::Rejected(_))
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// The settled result, `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, Error<E>>>
    where
        T: Clone,
        E: Clone,
    {
        match self {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
            PromiseState::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

struct Inner<T, E> {
    state: PromiseState<T, E>,
    waiters: Vec<Reaction<T, E>>,
    wakers: Vec<Waker>,
}

/// A single-assignment container for a value of type `T` or a rejection
/// reason of type [`Error<E>`].
///
/// Cloning a `Promise` copies the reference, not the container: every clone
/// observes the same settlement. Promises are bound to the thread that made
/// them and are settled by that thread's [`queue`].
///
/// # Examples
///
/// ```
/// use promise_aplus::{queue, Error, Promise, Resolution};
///
/// let promise: Promise<u8, String> = Promise::new(|_resolver, rejecter| {
///     rejecter.reject("💥".to_string());
///     Ok(())
/// });
/// let recovered = promise.catch(|reason| {
///     assert_eq!(reason, Error::Rejected("💥".to_string()));
///     Ok(Resolution::Value(0))
/// });
/// assert_eq!(queue::block_on(recovered), Some(Ok(0)));
/// ```
pub struct Promise<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Debug, E: Debug> Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f.debug_struct("Promise").field("state", &inner.state).finish(),
            Err(_) => f.debug_struct("Promise").finish_non_exhaustive(),
        }
    }
}

impl<T, E> Promise<T, E> {
    /// Whether both handles point at the same container.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub(crate) fn pending() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: PromiseState::Pending,
                waiters: vec![],
                wakers: vec![],
            })),
        }
    }

    /// Creates a promise and runs `executor` right away with its two settle
    /// capabilities.
    ///
    /// An `Err` returned by `executor` rejects the promise, unless one of the
    /// capabilities was used first. Only the first use of either capability
    /// counts.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_aplus::{queue, Promise};
    ///
    /// let promise: Promise<String, ()> = Promise::new(|resolver, rejecter| {
    ///     resolver.resolve("first".into());
    ///     resolver.resolve("second".into());
    ///     rejecter.reject(());
    ///     Ok(())
    /// });
    /// assert!(promise.is_pending());
    /// assert_eq!(queue::block_on(promise), Some(Ok("first".to_string())));
    /// ```
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T, E>, Rejecter<T, E>) -> Result<(), Error<E>>,
    {
        let promise = Self::pending();
        let (resolver, rejecter) = promise.capabilities();
        if let Err(reason) = executor(resolver, rejecter.clone()) {
            rejecter.reject_with(reason);
        }
        promise
    }

    /// Like [`Promise::new`] for a setup routine that may be missing.
    pub fn try_new(executor: Option<Executor<T, E>>) -> Result<Self, Error<E>> {
        match executor {
            Some(executor) => Ok(Self::new(executor)),
            None => Err(Error::InvalidExecutor),
        }
    }

    /// A promise fulfilled with `value`.
    pub fn resolve(value: T) -> Self {
        Self::resolve_with(Resolution::Value(value))
    }

    /// A promise settled the way `candidate` dictates: adopting another
    /// promise, assimilating a thenable, or fulfilling with a value.
    pub fn resolve_with(candidate: Resolution<T, E>) -> Self {
        let promise = Self::pending();
        resolve_promise(&promise, candidate);
        promise
    }

    pub fn reject(reason: E) -> Self {
        Self::reject_with(Error::Rejected(reason))
    }

    pub fn reject_with(reason: Error<E>) -> Self {
        let promise = Self::pending();
        promise.settle(Err(reason));
        promise
    }

    /// A pending promise bundled with its settle capabilities.
    pub fn deferred() -> Deferred<T, E> {
        Deferred::new()
    }

    /// A promise fulfilled with `value` once `delay` of queue time passed.
    pub fn resolve_after(delay: Duration, value: T) -> Self {
        let promise = Self::pending();
        let target = promise.clone();
        queue::set_timeout(delay, move || target.settle(Ok(value)));
        promise
    }

    /// A promise rejected with `reason` once `delay` of queue time passed.
    pub fn reject_after(delay: Duration, reason: E) -> Self {
        let promise = Self::pending();
        let target = promise.clone();
        queue::set_timeout(delay, move || target.settle(Err(Error::Rejected(reason))));
        promise
    }

    pub(crate) fn capabilities(&self) -> (Resolver<T, E>, Rejecter<T, E>) {
        let latch = Rc::new(Cell::new(false));
        (
            Resolver {
                promise: self.clone(),
                latch: latch.clone(),
            },
            Rejecter {
                promise: self.clone(),
                latch,
            },
        )
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> PromiseState<T, E> {
        self.inner.borrow().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().state.is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        self.inner.borrow().state.is_fulfilled()
    }

    pub fn is_rejected(&self) -> bool {
        self.inner.borrow().state.is_rejected()
    }

    pub(crate) fn outcome(&self) -> Option<Result<T, Error<E>>> {
        self.inner.borrow().state.outcome()
    }

    /// Queues the transition to a terminal state. The state itself is
    /// written by the queued task; a promise that is settled by then ignores
    /// it.
    pub(crate) fn settle(&self, outcome: Result<T, Error<E>>) {
        let promise = self.clone();
        queue::enqueue(move || promise.transition(outcome));
    }

    fn transition(&self, outcome: Result<T, Error<E>>) {
        let (waiters, wakers) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_settled() {
                trace!("late settlement ignored");
                return;
            }
            inner.state = match &outcome {
                Ok(value) => PromiseState::Fulfilled(value.clone()),
                Err(reason) => PromiseState::Rejected(reason.clone()),
            };
            (mem::take(&mut inner.waiters), mem::take(&mut inner.wakers))
        };
        trace!(
            fulfilled = outcome.is_ok(),
            waiters = waiters.len(),
            "promise settled"
        );
        for waiter in waiters {
            waiter(outcome.clone());
        }
        for waker in wakers {
            waker.wake();
        }
    }

    /// Calls `reaction` with the outcome once settled. On an already settled
    /// promise the call is still deferred to the queue.
    pub(crate) fn subscribe(&self, reaction: impl FnOnce(Result<T, Error<E>>) + 'static) {
        let mut inner = self.inner.borrow_mut();
        let settled = inner.state.outcome();
        match settled {
            None => inner.waiters.push(Box::new(reaction)),
            Some(outcome) => {
                drop(inner);
                queue::enqueue(move || reaction(outcome));
            }
        }
    }

    /// Registers a pair of handlers and returns the promise derived from
    /// whichever one runs.
    ///
    /// The handler's `Ok` candidate goes through the resolution procedure for
    /// the derived promise; its `Err` rejects the derived promise. A handler
    /// that panics is not caught: the panic unwinds out of the queue driver.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Outcome<U, E> + 'static,
        R: FnOnce(Error<E>) -> Outcome<U, E> + 'static,
    {
        let derived = Promise::pending();
        let target = derived.clone();
        self.subscribe(move |outcome| {
            let handled = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            };
            match handled {
                Ok(candidate) => resolve_promise(&target, candidate),
                Err(reason) => target.settle(Err(reason)),
            }
        });
        derived
    }

    /// [`Promise::then`] with optional handlers. A missing fulfillment
    /// handler passes the value through, a missing rejection handler passes
    /// the reason through.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_aplus::{queue, Promise};
    ///
    /// let promise: Promise<i32, ()> = Promise::resolve(1);
    /// let chained = promise.then_with(None, None).then_with(None, None);
    /// assert_eq!(queue::block_on(chained), Some(Ok(1)));
    /// ```
    pub fn then_with(
        &self,
        on_fulfilled: Option<OnFulfilled<T, T, E>>,
        on_rejected: Option<OnRejected<T, E>>,
    ) -> Promise<T, E> {
        let on_fulfilled: OnFulfilled<T, T, E> = match on_fulfilled {
            Some(handler) => handler,
            None => Box::new(|value: T| -> Outcome<T, E> { Ok(Resolution::Value(value)) }),
        };
        let on_rejected: OnRejected<T, E> = match on_rejected {
            Some(handler) => handler,
            None => Box::new(|reason: Error<E>| -> Outcome<T, E> { Err(reason) }),
        };
        self.then(on_fulfilled, on_rejected)
    }

    /// Handles fulfillment only; rejections pass through unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Outcome<U, E> + 'static,
    {
        self.then(on_fulfilled, |reason| Err(reason))
    }

    /// Maps the fulfillment value; rejections pass through unchanged.
    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }

    /// Handles rejection only; values pass through unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(Error<E>) -> Outcome<T, E> + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// Runs `on_settled` on either path, then settles the derived promise
    /// like this one.
    ///
    /// If `on_settled` raises, or hands back a candidate that ends up
    /// rejected, that rejection wins over the original outcome. A candidate
    /// that is still pending holds the derived promise back until it settles.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_aplus::{queue, Error, Promise, Resolution};
    ///
    /// let promise: Promise<i32, &str> = Promise::resolve(5);
    /// let cleaned = promise.finally(|| Ok(Resolution::Value(())));
    /// assert_eq!(queue::block_on(cleaned), Some(Ok(5)));
    ///
    /// let overridden = Promise::<i32, &str>::resolve(5).finally(|| Err("cleanup".into()));
    /// assert_eq!(queue::block_on(overridden), Some(Err(Error::Rejected("cleanup"))));
    /// ```
    pub fn finally<F>(&self, on_settled: F) -> Promise<T, E>
    where
        F: FnOnce() -> Outcome<(), E> + 'static,
    {
        let derived = Promise::pending();
        let target = derived.clone();
        self.subscribe(move |outcome| match on_settled() {
            Err(reason) => target.settle(Err(reason)),
            Ok(candidate) => {
                let gate = Promise::<(), E>::resolve_with(candidate);
                gate.subscribe(move |gated| match gated {
                    Ok(()) => target.settle(outcome),
                    Err(reason) => target.settle(Err(reason)),
                });
            }
        });
        derived
    }
}

impl<T, E> Future for Promise<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, Error<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match inner.state.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                if !inner.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

/// The fulfilling half of a pair of settle capabilities.
///
/// Both halves of a pair share one latch: whichever is used first settles
/// the promise, every later use on either half is ignored.
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
    latch: Rc<Cell<bool>>,
}

/// The rejecting half of a pair of settle capabilities, see [`Resolver`].
pub struct Rejecter<T, E> {
    promise: Promise<T, E>,
    latch: Rc<Cell<bool>>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            latch: self.latch.clone(),
        }
    }
}

impl<T, E> Clone for Rejecter<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            latch: self.latch.clone(),
        }
    }
}

impl<T, E> Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("done", &self.latch.get()).finish()
    }
}

impl<T, E> Debug for Rejecter<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejecter").field("done", &self.latch.get()).finish()
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn resolve(&self, value: T) {
        self.resolve_with(Resolution::Value(value));
    }

    /// Runs the resolution procedure for `candidate` against the promise.
    pub fn resolve_with(&self, candidate: Resolution<T, E>) {
        if self.latch.replace(true) {
            return;
        }
        resolve_promise(&self.promise, candidate);
    }

    /// Whether this pair of capabilities has been used.
    pub fn is_done(&self) -> bool {
        self.latch.get()
    }
}

impl<T, E> Rejecter<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn reject(&self, reason: E) {
        self.reject_with(Error::Rejected(reason));
    }

    pub fn reject_with(&self, reason: Error<E>) {
        if self.latch.replace(true) {
            return;
        }
        self.promise.settle(Err(reason));
    }

    /// Whether this pair of capabilities has been used.
    pub fn is_done(&self) -> bool {
        self.latch.get()
    }
}
