//! The body type agents are built from.

use std::future::Future;

use futures_util::future::BoxFuture;

use super::interaction::InteractionContext;

/// An agent body.
///
/// Implemented for every `Fn(InteractionContext) -> impl Future<Output =
/// anyhow::Result<()>>`, so plain async closures work as agents.
pub trait AgentFunction: Send + Sync + 'static {
    /// Run one interaction.
    fn call(&self, ctx: InteractionContext) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> AgentFunction for F
where
    F: Fn(InteractionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(&self, ctx: InteractionContext) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self(ctx))
    }
}
