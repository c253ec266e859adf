use thiserror::Error;

/// Terminal failure of a promise, streamed promise, or agent interaction.
///
/// `Clone` so the same failure can be handed to every consumer of a promise,
/// past and future, rather than only the first one to observe it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromiseError {
    /// The producer raised an error while generating a piece or a value.
    #[error("producer failed: {0}")]
    Producer(String),

    /// An agent body returned an error or panicked.
    #[error("agent '{agent}' failed: {reason}")]
    Agent { agent: String, reason: String },

    /// Input to sequence flattening could not be turned into messages.
    #[error("cannot flatten input: {0}")]
    Flatten(String),

    /// The owning run context was torn down, or the producer went away
    /// without reaching a terminal state.
    #[error("cancelled")]
    Cancelled,

    /// A piece or outcome was pushed after the promise had already finished.
    #[error("promise already finished")]
    AlreadyFinished,
}

impl PromiseError {
    /// Build a producer failure from anything displayable.
    pub fn producer(reason: impl std::fmt::Display) -> Self {
        Self::Producer(reason.to_string())
    }

    /// Build an agent failure, keeping the full `anyhow`-style cause chain.
    pub fn agent(agent: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Agent {
            agent: agent.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this failure is a cancellation rather than an ordinary error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors building a `Message` from loosely-typed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// The JSON value has a shape that cannot become a message.
    #[error("{0} is not a message")]
    NotAMessage(String),

    /// The `text` field is present but not a string.
    #[error("message text must be a string, got {0}")]
    InvalidText(String),
}

impl From<MessageError> for PromiseError {
    fn from(err: MessageError) -> Self {
        Self::Flatten(err.to_string())
    }
}
