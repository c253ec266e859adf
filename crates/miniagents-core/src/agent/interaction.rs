//! Per-invocation context handed to agent bodies.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use miniagents_types::error::PromiseError;

use crate::message::{MessageInput, MessageSequencePromise};
use crate::promise::StreamAppender;
use crate::run::RunContext;

/// Write side of an agent's outbound sequence.
///
/// Replies are kept in call order and flattened into the outbound sequence
/// as they arrive. Clones write to the same sequence; none of them finishes
/// it, that happens when the agent body returns.
pub struct ReplySink {
    appender: StreamAppender<MessageInput>,
}

impl ReplySink {
    pub(crate) fn new(appender: &StreamAppender<MessageInput>) -> Self {
        Self {
            appender: appender.handle(),
        }
    }

    /// Queue `input` for the outbound sequence.
    ///
    /// Fails with `AlreadyFinished` once the interaction is over.
    pub fn reply(&self, input: impl Into<MessageInput>) -> Result<(), PromiseError> {
        self.appender.append(input.into())
    }

    /// Whether the outbound sequence is closed.
    pub fn is_finished(&self) -> bool {
        self.appender.is_finished()
    }
}

impl Clone for ReplySink {
    fn clone(&self) -> Self {
        Self {
            appender: self.appender.handle(),
        }
    }
}

impl fmt::Debug for ReplySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySink")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Everything one agent invocation sees.
#[derive(Clone)]
pub struct InteractionContext {
    agent: Arc<str>,
    interaction_id: Uuid,
    options: Arc<Map<String, Value>>,
    input: MessageSequencePromise,
    reply: ReplySink,
    run: RunContext,
}

impl InteractionContext {
    pub(crate) fn new(
        agent: Arc<str>,
        interaction_id: Uuid,
        options: Arc<Map<String, Value>>,
        input: MessageSequencePromise,
        reply: ReplySink,
        run: RunContext,
    ) -> Self {
        Self {
            agent,
            interaction_id,
            options,
            input,
            reply,
            run,
        }
    }

    /// The inbound messages.
    pub fn messages(&self) -> &MessageSequencePromise {
        &self.input
    }

    /// Queue a reply. See [`ReplySink::reply`].
    pub fn reply(&self, input: impl Into<MessageInput>) -> Result<(), PromiseError> {
        self.reply.reply(input)
    }

    /// A handle for replying from other tasks.
    pub fn reply_sink(&self) -> ReplySink {
        self.reply.clone()
    }

    /// Name of the agent being run.
    pub fn agent_name(&self) -> &str {
        &self.agent
    }

    /// Identifier of this invocation.
    pub fn interaction_id(&self) -> Uuid {
        self.interaction_id
    }

    /// One option from the agent defaults merged with per-call options.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// All merged options.
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// The run context the agent was invoked in.
    pub fn run(&self) -> &RunContext {
        &self.run
    }
}

impl fmt::Debug for InteractionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionContext")
            .field("agent", &self.agent)
            .field("interaction_id", &self.interaction_id)
            .field("options", &self.options)
            .finish()
    }
}
