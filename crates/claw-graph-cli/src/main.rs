//! Clawgraph CLI binary entrypoint.
//!
//! This is the main entry point for the `clawgraph` command-line tool.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use claw_graph_cli::cli::{Cli, Commands};
use claw_graph_cli::config::CliConfig;
use claw_graph_cli::output::OutputFormat;
use claw_graph_cli::GraphCommand;

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let format = OutputFormat::new(cli.format);
    let command = GraphCommand::new(config);

    let request = match &cli.command {
        Commands::Namespaces(args) => args.apply(command.base_request().clone()),
        Commands::Node(args) => args.apply(command.base_request().clone()),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling graph queries");
            on_interrupt.cancel();
        }
    });

    let mut stdout = io::stdout().lock();
    command
        .execute(&mut stdout, &format, &request, &cancel)
        .await
        .context("building graph")?;
    Ok(())
}
