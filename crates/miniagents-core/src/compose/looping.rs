//! Repeating a chain with its output fed back as input.

use tracing::debug;

use miniagents_types::error::PromiseError;

use super::chain::{ChainLink, chain};
use super::settle;
use crate::message::{MessageInput, MessageSequencePromise, flatten};
use crate::run::RunContext;

/// When a loop stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopOptions {
    /// Stop after this many iterations. `None` loops until failure or cancellation.
    pub max_iterations: Option<usize>,
}

impl LoopOptions {
    /// Stop after `n` iterations.
    pub fn iterations(n: usize) -> Self {
        Self {
            max_iterations: Some(n),
        }
    }
}

/// Run the chain `links` repeatedly, feeding each iteration's output to the next.
///
/// Every iteration's output is fully resolved before the next one starts.
/// Returns the last output once `max_iterations` is reached, the first
/// failure of any iteration, or `Cancelled` when `run` is cancelled. A chain
/// with no agents returns the flattened input without iterating.
pub async fn loop_agents(
    run: &RunContext,
    links: impl IntoIterator<Item = ChainLink>,
    input: impl Into<MessageInput>,
    options: LoopOptions,
) -> Result<MessageSequencePromise, PromiseError> {
    let links: Vec<ChainLink> = links.into_iter().collect();
    let mut current = flatten(run, input);
    if !links.iter().any(|link| matches!(link, ChainLink::Agent(_))) {
        return Ok(current);
    }

    let mut iteration = 0;
    while options.max_iterations.is_none_or(|max| iteration < max) {
        if run.is_cancelled() {
            return Err(PromiseError::Cancelled);
        }
        current = chain(run, links.iter().cloned(), current);
        let settled = settle(run, &current).await?;
        iteration += 1;
        debug!(iteration, messages = settled.len(), "loop iteration finished");
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::agent::{Agent, InteractionContext};

    fn increment() -> Agent {
        Agent::new("increment", |ctx: InteractionContext| async move {
            for text in ctx.messages().texts().await? {
                let n: u64 = text.parse()?;
                ctx.reply((n + 1).to_string())?;
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn feeds_output_back() {
        let run = RunContext::default();
        let out = loop_agents(&run, [increment().into()], "0", LoopOptions::iterations(5))
            .await
            .unwrap();
        assert_eq!(out.texts().await.unwrap(), vec!["5"]);
    }

    #[tokio::test]
    async fn zero_iterations_returns_input() {
        let run = RunContext::default();
        let out = loop_agents(&run, [increment().into()], "7", LoopOptions::iterations(0))
            .await
            .unwrap();
        assert_eq!(out.texts().await.unwrap(), vec!["7"]);
    }

    #[tokio::test]
    async fn failure_stops_loop() {
        let run = RunContext::default();
        let err = loop_agents(&run, [increment().into()], "not a number", LoopOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PromiseError::Agent { agent, .. } if agent == "increment"));
    }

    #[tokio::test]
    async fn cancellation_stops_unbounded_loop() {
        let run = RunContext::default();
        let canceller = run.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let result = loop_agents(&run, [increment().into()], "0", LoopOptions::default()).await;
        assert_eq!(result.unwrap_err(), PromiseError::Cancelled);
    }

    #[tokio::test]
    async fn no_agents_means_no_iterations() {
        let run = RunContext::default();
        let out = loop_agents(&run, [ChainLink::Barrier], "as-is", LoopOptions::default())
            .await
            .unwrap();
        assert_eq!(out.texts().await.unwrap(), vec!["as-is"]);
    }
}
