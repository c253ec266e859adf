//! CLI command definitions for the `miniagents` binary.
//!
//! Every command builds a run context from the loaded configuration, runs a
//! small pipeline of built-in agents, and prints the result.

pub mod demo;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miniagents_observe::tracing_setup::TracingOptions;
use miniagents_types::event::RuntimeEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Run MiniAgents demo pipelines.
#[derive(Parser)]
#[command(name = "miniagents", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of plain text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all logging except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Runtime config file (TOML).
    #[arg(long, global = true, env = "MINIAGENTS_CONFIG", default_value = "miniagents.toml")]
    pub config: PathBuf,

    /// Start agents only when their output is read.
    #[arg(long, global = true)]
    pub on_demand: bool,

    /// Turn agent failures into trailing error messages.
    #[arg(long, global = true)]
    pub errors_as_messages: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "MINIAGENTS_LOG_JSON")]
    pub log_json: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream messages through a chain of echo agents.
    Echo {
        /// Messages to send.
        #[arg(required = true)]
        messages: Vec<String>,

        /// Number of echo agents in the chain.
        #[arg(long, default_value_t = 1)]
        stages: usize,

        /// Wait for each stage to finish before starting the next.
        #[arg(long)]
        barrier: bool,
    },

    /// Flatten a JSON document into a message sequence.
    Flatten {
        /// JSON input: a string, an object with "text", or nested arrays of those.
        input: String,
    },

    /// Run a scripted user against an echo assistant.
    Dialog {
        /// Lines the user says, one per turn.
        #[arg(required = true)]
        lines: Vec<String>,

        /// Stop after this many assistant turns.
        #[arg(long)]
        max_turns: Option<usize>,

        /// Give the assistant the whole history each turn.
        #[arg(long)]
        feed_history: bool,
    },

    /// Repeatedly feed a message through an agent that appends a suffix.
    Loop {
        /// Starting message.
        message: String,

        /// Number of iterations.
        #[arg(long, default_value_t = 3)]
        iterations: usize,

        /// Suffix appended each iteration.
        #[arg(long, default_value = "!")]
        suffix: String,
    },

    /// Print the effective runtime configuration.
    Config,
}

/// Map the logging flags onto tracing options.
pub fn tracing_options(cli: &Cli) -> TracingOptions {
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,miniagents_core=debug",
        _ => "trace",
    };
    TracingOptions {
        default_filter: filter.to_string(),
        json: cli.log_json,
        otel: cli.otel,
    }
}

/// Log runtime events until the bus closes. Returns how many were logged.
///
/// A lagging receiver skips the dropped events and keeps going.
pub async fn log_events(mut events: broadcast::Receiver<RuntimeEvent>) -> usize {
    let mut logged = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                debug!(?event, "runtime event");
                logged += 1;
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log fell behind"),
            Err(RecvError::Closed) => return logged,
        }
    }
}
