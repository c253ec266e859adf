//! MessagePersister trait definition.
//!
//! Uses RPITIT for `persist`. Persisters are stored as trait objects in the
//! run context, so a blanket-implemented `MessagePersisterDyn` with boxed
//! futures provides the object-safe view.

use std::future::Future;
use std::pin::Pin;

use miniagents_types::message::Message;

use crate::run::RunContext;

/// Hook invoked once per resolved message.
///
/// Implementations record content and `hash_key` wherever they like. Errors
/// are logged and reported to the run context's error handler; they never
/// fail the message itself.
pub trait MessagePersister: Send + Sync {
    /// Record a resolved message.
    fn persist(
        &self,
        run: &RunContext,
        message: &Message,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Object-safe version of [`MessagePersister`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing
/// `MessagePersister`.
pub trait MessagePersisterDyn: Send + Sync {
    fn persist_boxed<'a>(
        &'a self,
        run: &'a RunContext,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

impl<T: MessagePersister> MessagePersisterDyn for T {
    fn persist_boxed<'a>(
        &'a self,
        run: &'a RunContext,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(self.persist(run, message))
    }
}
