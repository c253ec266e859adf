mod cli;
mod config;

use clap::Parser;
use miniagents_core::{ErrorReport, InMemoryMessageStore, RunContext};
use miniagents_observe::tracing_setup::{init_tracing, shutdown_tracing};
use tracing::{debug, error};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli::tracing_options(&cli)) {
        eprintln!("Warning: tracing setup failed: {e}");
    }

    let mut runtime_config = config::load_runtime_config(&cli.config).await;
    if cli.on_demand {
        runtime_config.scheduling = miniagents_core::SchedulingMode::OnDemand;
    }
    if cli.errors_as_messages {
        runtime_config.errors_as_messages = true;
    }

    if let Commands::Config = &cli.command {
        cli::demo::show_config(&runtime_config, cli.json)?;
        return Ok(());
    }

    let store = InMemoryMessageStore::new();
    let run = RunContext::builder()
        .config(runtime_config)
        .persister(store.clone())
        .on_error(|report| match report {
            ErrorReport::Agent { agent, error, .. } => error!(agent, %error, "agent failed"),
            ErrorReport::Persist { message, error } => {
                error!(hash_key = message.hash_key(), %error, "persist failed")
            }
        })
        .build();

    tokio::spawn(cli::log_events(run.events().subscribe()));

    let result = match cli.command {
        Commands::Echo {
            messages,
            stages,
            barrier,
        } => cli::demo::run_echo(&run, messages, stages, barrier, cli.json).await,
        Commands::Flatten { input } => cli::demo::run_flatten(&run, &input, cli.json).await,
        Commands::Dialog {
            lines,
            max_turns,
            feed_history,
        } => cli::demo::run_dialog(&run, lines, max_turns, feed_history, cli.json).await,
        Commands::Loop {
            message,
            iterations,
            suffix,
        } => cli::demo::run_loop(&run, message, iterations, &suffix, cli.json).await,
        Commands::Config => Ok(()),
    };

    if result.is_err() {
        run.shutdown().await;
    } else {
        run.finish().await;
    }
    debug!(persisted = store.len(), "run complete");

    shutdown_tracing();
    result
}
