//! Single-resolution promise shared by many waiters.
//!
//! A `Promise<T>` is Pending until its `Resolver` (or the producer future it
//! was created from) settles it, then stays Resolved or Failed forever. Every
//! waiter, whenever it arrives, observes the same outcome.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tokio::sync::Notify;

use miniagents_types::error::PromiseError;

use super::{DeferredStart, lock, panic_message};
use crate::run::RunContext;

struct PromiseShared<T> {
    outcome: Mutex<Option<Result<T, PromiseError>>>,
    notify: Notify,
}

impl<T> PromiseShared<T> {
    fn new(outcome: Option<Result<T, PromiseError>>) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            notify: Notify::new(),
        }
    }

    /// Record the outcome if none is recorded yet. Returns whether it was recorded.
    fn settle(&self, outcome: Result<T, PromiseError>) -> bool {
        {
            let mut slot = lock(&self.outcome);
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
        }
        self.notify.notify_waiters();
        true
    }
}

/// A value that becomes available once, later.
///
/// Cloning shares the same underlying cell.
pub struct Promise<T> {
    shared: Arc<PromiseShared<T>>,
    starter: Arc<DeferredStart>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            starter: Arc::clone(&self.starter),
        }
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// An already-resolved promise.
    pub fn ready(value: T) -> Self {
        Self::from_shared(PromiseShared::new(Some(Ok(value))))
    }

    /// An already-failed promise.
    pub fn failed(error: PromiseError) -> Self {
        Self::from_shared(PromiseShared::new(Some(Err(error))))
    }

    fn from_shared(shared: PromiseShared<T>) -> Self {
        Self {
            shared: Arc::new(shared),
            starter: Arc::default(),
        }
    }

    /// A pending promise and the handle that settles it.
    pub fn pending() -> (Resolver<T>, Self) {
        let promise = Self::from_shared(PromiseShared::new(None));
        let resolver = Resolver {
            shared: Some(Arc::clone(&promise.shared)),
        };
        (resolver, promise)
    }

    /// A promise settled by `producer`, run as a task of `run`.
    ///
    /// The producer is invoked at most once: immediately under eager
    /// scheduling, or on the first `wait` under on-demand scheduling. A panic
    /// in the producer is captured as `PromiseError::Producer`; cancellation of
    /// `run` settles the promise with `PromiseError::Cancelled`.
    pub fn resolve<F>(run: &RunContext, producer: F) -> Self
    where
        F: Future<Output = Result<T, PromiseError>> + Send + 'static,
    {
        let (resolver, promise) = Self::pending();
        let task = async move {
            let outcome = match AssertUnwindSafe(producer).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(PromiseError::Producer(panic_message(payload))),
            };
            resolver.settle(outcome);
        };
        run.schedule(&promise.starter, task);
        promise
    }

    /// The outcome, if already settled. Does not start an on-demand producer.
    pub fn peek(&self) -> Option<Result<T, PromiseError>> {
        lock(&self.shared.outcome).clone()
    }

    /// Whether the promise has settled.
    pub fn is_settled(&self) -> bool {
        lock(&self.shared.outcome).is_some()
    }

    /// Wait for the outcome.
    pub async fn wait(&self) -> Result<T, PromiseError> {
        self.starter.trigger();
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a settle between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            if let Some(outcome) = self.peek() {
                return outcome;
            }
            notified.await;
        }
    }
}

impl<T> IntoFuture for Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T, PromiseError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*lock(&self.shared.outcome) {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

/// The write side of a pending `Promise`.
///
/// Dropping a resolver without settling fails the promise with
/// `PromiseError::Cancelled`, so waiters never hang on a producer that died.
pub struct Resolver<T> {
    shared: Option<Arc<PromiseShared<T>>>,
}

impl<T> Resolver<T> {
    /// Resolve with a value.
    pub fn resolve(self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Fail with an error.
    pub fn fail(self, error: PromiseError) -> bool {
        self.settle(Err(error))
    }

    /// Settle with an outcome. Returns `false` if the promise had already settled.
    pub fn settle(mut self, outcome: Result<T, PromiseError>) -> bool {
        match self.shared.take() {
            Some(shared) => shared.settle(outcome),
            None => false,
        }
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.settle(Err(PromiseError::Cancelled));
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.shared.is_none())
            .finish()
    }
}
