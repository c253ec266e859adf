//! Promise primitives.
//!
//! - `cell` -- `Promise<T>`: one eventual value or failure, shared by any number of waiters
//! - `streamed` -- `StreamedPromise<P, W>`: an append-only piece buffer replayed to every
//!   consumer from index zero, reducible to a whole
//!
//! Both keep their state behind a `std::sync::Mutex` that is never held across
//! `.await`, and wake waiters through `tokio::sync::Notify`.

pub mod cell;
pub mod streamed;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use cell::{Promise, Resolver};
pub use streamed::{PieceIter, StreamAppender, StreamedPromise};

/// Lock a mutex, recovering the guard if another thread panicked while
/// holding it. State behind these locks is only ever replaced whole, so a
/// poisoned guard never exposes a half-written value.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type StartFn = Box<dyn FnOnce() + Send>;

/// A producer start that has been postponed until first demand.
///
/// Holds the closure that spawns the producer task. `trigger` runs it at most
/// once; later calls are no-ops. Only read handles own a `DeferredStart`; the
/// shared state the producer writes into never points back at it, so dropping
/// every handle of an unread promise frees the closure and its captures.
#[derive(Default)]
pub(crate) struct DeferredStart {
    start: Mutex<Option<StartFn>>,
}

impl DeferredStart {
    pub(crate) fn set(&self, start: StartFn) {
        *lock(&self.start) = Some(start);
    }

    pub(crate) fn trigger(&self) {
        let start = lock(&self.start).take();
        if let Some(start) = start {
            start();
        }
    }

    /// Drop the pending start without running it.
    ///
    /// The never-started task owns the write side of its promise, so dropping
    /// it records `Cancelled` for every reader.
    pub(crate) fn discard(&self) -> bool {
        let start = lock(&self.start).take();
        start.is_some()
    }

    pub(crate) fn is_pending(&self) -> bool {
        lock(&self.start).is_some()
    }
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
