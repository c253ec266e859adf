//! Agents and their interactions.
//!
//! - `function` -- `AgentFunction`, the body type an agent is built from
//! - `agent` -- `Agent`: named, forkable, eagerly scheduled
//! - `interaction` -- `InteractionContext` and `ReplySink`, handed to each invocation
//! - `call` -- `AgentCall`: an invocation whose input is sent incrementally

pub mod agent;
pub mod call;
pub mod function;
pub mod interaction;

pub use agent::Agent;
pub use call::AgentCall;
pub use function::AgentFunction;
pub use interaction::{InteractionContext, ReplySink};
