//! Agent chains.
//!
//! Each agent's outbound sequence is the next agent's inbound sequence, so
//! by default neighbouring agents overlap: a downstream agent reads messages
//! as soon as the upstream one emits them. A barrier between two agents makes
//! the downstream one start only after the upstream sequence has fully
//! resolved, and turns any upstream failure into the chain's failure.

use tracing::debug;

use super::settle;
use crate::agent::{Agent, InteractionContext};
use crate::message::{MessageInput, MessageSequencePromise, flatten};
use crate::promise::Promise;
use crate::run::RunContext;

/// One step of a chain.
#[derive(Clone, Debug)]
pub enum ChainLink {
    /// Feed the current sequence to this agent.
    Agent(Agent),
    /// Wait for the current sequence to fully resolve before continuing.
    Barrier,
}

impl From<Agent> for ChainLink {
    fn from(agent: Agent) -> Self {
        Self::Agent(agent)
    }
}

/// Run `links` in order over `input` and return the final sequence at once.
pub fn chain(
    run: &RunContext,
    links: impl IntoIterator<Item = ChainLink>,
    input: impl Into<MessageInput>,
) -> MessageSequencePromise {
    let mut current = flatten(run, input);
    let mut barrier = false;
    for link in links {
        match link {
            ChainLink::Barrier => barrier = true,
            ChainLink::Agent(agent) if barrier => {
                current = after_barrier(run, current, Some(agent));
                barrier = false;
            }
            ChainLink::Agent(agent) => current = agent.inquire(run, current),
        }
    }
    if barrier {
        current = after_barrier(run, current, None);
    }
    current
}

/// A sequence that appears once `upstream` has fully resolved, passed through
/// `next` when given.
fn after_barrier(
    run: &RunContext,
    upstream: MessageSequencePromise,
    next: Option<Agent>,
) -> MessageSequencePromise {
    let scope = run.clone();
    let deferred = Promise::resolve(run, async move {
        let settled = settle(&scope, &upstream).await?;
        debug!(messages = settled.len(), "barrier passed");
        Ok(match next {
            Some(agent) => MessageInput::Sequence(agent.inquire(&scope, settled)),
            None => MessageInput::from(settled),
        })
    });
    flatten(run, MessageInput::Deferred(deferred))
}

/// Builder for a reusable chain.
#[derive(Clone, Debug, Default)]
pub struct Chain {
    links: Vec<ChainLink>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an agent.
    pub fn then(mut self, agent: Agent) -> Self {
        self.links.push(ChainLink::Agent(agent));
        self
    }

    /// Append a barrier.
    pub fn barrier(mut self) -> Self {
        self.links.push(ChainLink::Barrier);
        self
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Run the chain over `input`.
    pub fn run(&self, run: &RunContext, input: impl Into<MessageInput>) -> MessageSequencePromise {
        chain(run, self.links.iter().cloned(), input)
    }

    /// Wrap the chain in an agent that replies with the chain's output.
    pub fn into_agent(self, name: impl Into<String>) -> Agent {
        let links = self.links;
        Agent::new(name, move |ctx: InteractionContext| {
            let links = links.clone();
            async move {
                let output = chain(ctx.run(), links, ctx.messages().clone());
                ctx.reply(output)?;
                Ok(())
            }
        })
    }
}
