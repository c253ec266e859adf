//! `AgentCall`: an invocation fed one input at a time.

use std::fmt;

use miniagents_types::error::PromiseError;

use crate::message::{MessageInput, MessageSequencePromise};
use crate::promise::StreamAppender;

/// An in-flight invocation whose input is still open.
///
/// The agent is already running when this is returned. Dropping the call
/// without `finish` closes the input all the same.
pub struct AgentCall {
    input: StreamAppender<MessageInput>,
    reply: MessageSequencePromise,
}

impl AgentCall {
    pub(crate) fn new(input: StreamAppender<MessageInput>, reply: MessageSequencePromise) -> Self {
        Self { input, reply }
    }

    /// Add to the agent's input.
    pub fn send(&self, input: impl Into<MessageInput>) -> Result<&Self, PromiseError> {
        self.input.append(input.into())?;
        Ok(self)
    }

    /// The agent's outbound sequence.
    pub fn reply_sequence(&self) -> MessageSequencePromise {
        self.reply.clone()
    }

    /// Close the input and return the outbound sequence.
    pub fn finish(self) -> MessageSequencePromise {
        self.input.complete();
        self.reply.clone()
    }

    /// Whether the input is closed.
    pub fn is_finished(&self) -> bool {
        self.input.is_finished()
    }
}

impl Drop for AgentCall {
    fn drop(&mut self) {
        self.input.complete();
    }
}

impl fmt::Debug for AgentCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCall")
            .field("input_finished", &self.is_finished())
            .field("reply", &self.reply)
            .finish()
    }
}
