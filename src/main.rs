//! Podrescue CLI
//!
//! Command-line interface for the podcast audio rescue tools.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use podrescue::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Podrescue v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.config();
    match cli.command {
        Some(cmd) => handle_command(cmd, config),
        None => {
            println!("Podrescue v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: podrescue::RescueConfig) -> anyhow::Result<()> {
    match cmd {
        Commands::Balance {
            input,
            output,
            lufs,
            lra,
            true_peak,
        } => commands::balance(config, &input, output.as_deref(), lufs, lra, true_peak)
            .with_context(|| format!("balance failed for {}", input.display())),
        Commands::Rescue { input, output } => commands::rescue(config, &input, output.as_deref())
            .with_context(|| format!("rescue failed for {}", input.display())),
        Commands::Enhance {
            input,
            provider,
            params,
            output,
            timeout,
        } => commands::enhance(
            config,
            &input,
            &provider,
            &params,
            output.as_deref(),
            Duration::from_secs(timeout),
        )
        .with_context(|| format!("{} failed for {}", provider, input.display())),
        Commands::Providers { json } => {
            commands::providers(json).context("could not list providers")
        }
        Commands::Sweep { older_than } => {
            commands::sweep(config, Duration::from_secs(older_than)).context("sweep failed")
        }
    }
}
