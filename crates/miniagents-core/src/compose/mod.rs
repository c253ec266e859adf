//! Composition utilities that connect agents' outputs to other agents' inputs.
//!
//! - `chain` -- `chain()` and the `Chain` builder, with optional barriers
//! - `looping` -- `loop_agents()`: repeat a chain, feeding output back as input
//! - `dialog` -- `dialog()`: two agents taking turns over a shared history

pub mod chain;
pub mod dialog;
pub mod looping;

pub use chain::{Chain, ChainLink, chain};
pub use dialog::{DialogHistory, DialogOptions, DialogOutcome, InMemoryHistory, dialog};
pub use looping::{LoopOptions, loop_agents};

use miniagents_types::error::PromiseError;
use miniagents_types::message::Message;

use crate::message::MessageSequencePromise;
use crate::run::RunContext;

/// Wait for every message of `sequence`, or for cancellation of `run`.
pub(crate) async fn settle(
    run: &RunContext,
    sequence: &MessageSequencePromise,
) -> Result<Vec<Message>, PromiseError> {
    tokio::select! {
        biased;
        _ = run.cancellation_token().cancelled() => Err(PromiseError::Cancelled),
        messages = sequence.messages() => messages,
    }
}
