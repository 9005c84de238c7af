use crate::promise::{Promise, Rejecter, Resolver};
use crate::resolution::Resolution;

/// A pending promise together with the capabilities that settle it, for
/// callers that settle from outside a setup routine.
///
/// # Examples
///
/// ```
/// use promise_aplus::{queue, Deferred};
/// use std::time::Duration;
///
/// let deferred = Deferred::<String, ()>::new();
/// let promise = deferred.promise.clone();
/// queue::set_timeout(Duration::from_millis(100), move || deferred.resolve(String::from("🍓")));
///
/// assert_eq!(queue::block_on(promise), Some(Ok(String::from("🍓"))));
/// ```
#[derive(Debug)]
pub struct Deferred<T, E> {
    pub promise: Promise<T, E>,
    pub resolver: Resolver<T, E>,
    pub rejecter: Rejecter<T, E>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            resolver: self.resolver.clone(),
            rejecter: self.rejecter.clone(),
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn new() -> Self {
        let promise = Promise::pending();
        let (resolver, rejecter) = promise.capabilities();
        Self {
            promise,
            resolver,
            rejecter,
        }
    }

    pub fn resolve(&self, value: T) {
        self.resolver.resolve(value);
    }

    pub fn resolve_with(&self, candidate: Resolution<T, E>) {
        self.resolver.resolve_with(candidate);
    }

    pub fn reject(&self, reason: E) {
        self.rejecter.reject(reason);
    }

    pub fn into_parts(self) -> (Promise<T, E>, Resolver<T, E>, Rejecter<T, E>) {
        (self.promise, self.resolver, self.rejecter)
    }
}

impl<T, E> Default for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
