//! Streaming-promise runtime for asynchronous multi-agent message passing.
//!
//! Agents are named async functions scheduled eagerly inside a [`RunContext`].
//! They read an inbound [`MessageSequencePromise`] and push replies that become
//! a replayable outbound sequence, consumable by any number of readers --
//! including other agents further down a [`Chain`].
//!
//! Depends only on `miniagents-types` plus tokio and the futures ecosystem.

pub mod agent;
pub mod compose;
pub mod event;
pub mod message;
pub mod persist;
pub mod promise;
pub mod run;

pub use agent::{Agent, AgentCall, AgentFunction, InteractionContext, ReplySink};
pub use compose::{
    Chain, ChainLink, DialogHistory, DialogOptions, DialogOutcome, InMemoryHistory, LoopOptions,
    chain, dialog, loop_agents,
};
pub use event::EventBus;
pub use message::{MessageInput, MessagePromise, MessageSequencePromise, flatten};
pub use miniagents_types::config::{RuntimeConfig, SchedulingMode};
pub use miniagents_types::error::PromiseError;
pub use miniagents_types::message::Message;
pub use persist::{InMemoryMessageStore, MessagePersister};
pub use promise::{PieceIter, Promise, Resolver, StreamAppender, StreamedPromise};
pub use run::{ErrorReport, RunContext, RunContextBuilder};
