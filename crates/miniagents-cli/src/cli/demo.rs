//! Built-in demo agents and the command handlers that wire them together.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use miniagents_core::{
    Agent, Chain, DialogOptions, InMemoryHistory, InteractionContext, LoopOptions, MessagePromise,
    PromiseError, RunContext, RuntimeConfig, dialog, flatten, loop_agents,
};
use tracing::info;

use super::output::{print_sequence, render_transcript};

/// Delay between streamed tokens, so token streaming is visible in a terminal.
const TOKEN_DELAY: Duration = Duration::from_millis(30);

/// Re-emits every inbound message word by word.
pub fn typewriter() -> Agent {
    Agent::new("typewriter", |ctx: InteractionContext| async move {
        let mut inbound = ctx.messages().iter();
        while let Some(promise) = inbound.next().await {
            let message = promise?.message().await?;
            let text = message.text().to_string();
            let tokens = async_stream::stream! {
                for (i, word) in text.split(' ').enumerate() {
                    tokio::time::sleep(TOKEN_DELAY).await;
                    let token = if i == 0 { word.to_string() } else { format!(" {word}") };
                    yield Ok::<_, PromiseError>(token);
                }
            };
            ctx.reply(MessagePromise::streamed(ctx.run(), tokens, message.metadata().clone()))?;
        }
        Ok(())
    })
    .describe("streams each message one word at a time")
}

/// Answers every inbound message with "You said: ...", streaming the
/// original tokens through as they arrive.
pub fn echo(name: &str) -> Agent {
    Agent::new(name, |ctx: InteractionContext| async move {
        let mut inbound = ctx.messages().iter();
        while let Some(promise) = inbound.next().await {
            let promise = promise?;
            let reply = MessagePromise::from_producer(ctx.run(), BTreeMap::new(), move |out| async move {
                out.append("You said: ".to_string())?;
                let mut tokens = promise.tokens();
                while let Some(token) = tokens.next().await {
                    out.append(token?)?;
                }
                Ok(())
            });
            ctx.reply(reply)?;
        }
        Ok(())
    })
    .describe("repeats what it hears")
}

/// Appends the `suffix` option to every inbound message.
pub fn suffixer(suffix: &str) -> Agent {
    Agent::new("suffixer", |ctx: InteractionContext| async move {
        let suffix = ctx
            .option("suffix")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        for message in ctx.messages().messages().await? {
            ctx.reply(message.with_text(format!("{}{suffix}", message.text())))?;
        }
        Ok(())
    })
    .with_option("suffix", suffix)
}

/// Says the scripted lines one per turn, then falls silent.
pub fn scripted_user(lines: Vec<String>) -> Agent {
    let next = Arc::new(Mutex::new(lines.into_iter()));
    Agent::new("user", move |ctx: InteractionContext| {
        let line = next.lock().map(|mut lines| lines.next()).unwrap_or(None);
        async move {
            if let Some(line) = line {
                ctx.reply(line)?;
            }
            Ok(())
        }
    })
}

pub async fn run_echo(
    run: &RunContext,
    messages: Vec<String>,
    stages: usize,
    barrier: bool,
    json: bool,
) -> Result<()> {
    let mut pipeline = Chain::new().then(typewriter());
    for stage in 0..stages {
        if barrier {
            pipeline = pipeline.barrier();
        }
        pipeline = pipeline.then(echo(&format!("echo-{}", stage + 1)));
    }
    let out = pipeline.run(run, messages);
    let resolved = print_sequence(&out, json).await?;
    info!(messages = resolved.len(), stages, "echo pipeline finished");
    Ok(())
}

pub async fn run_flatten(run: &RunContext, input: &str, json: bool) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(input)?;
    let sequence = flatten(run, value);
    print_sequence(&sequence, json).await?;
    Ok(())
}

pub async fn run_dialog(
    run: &RunContext,
    lines: Vec<String>,
    max_turns: Option<usize>,
    feed_history: bool,
    json: bool,
) -> Result<()> {
    let history = InMemoryHistory::new();
    let options = DialogOptions {
        max_turns,
        history: Arc::new(history.clone()),
        feed_history,
    };
    let outcome = dialog(run, &scripted_user(lines), &echo("assistant"), options).await?;
    println!("{}", render_transcript(&history.entries(), json)?);
    info!(turns = outcome.turns, "dialog finished");
    Ok(())
}

pub async fn run_loop(
    run: &RunContext,
    message: String,
    iterations: usize,
    suffix: &str,
    json: bool,
) -> Result<()> {
    let links = Chain::new().then(suffixer(suffix)).links().to_vec();
    let out = loop_agents(run, links, message, LoopOptions::iterations(iterations)).await?;
    print_sequence(&out, json).await?;
    Ok(())
}

pub fn show_config(config: &RuntimeConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", toml::to_string(config)?);
    }
    Ok(())
}
