//! Palaver CLI — the main entry point.
//!
//! Commands:
//! - `init`   — Write a default config file
//! - `run`    — Start the transport and the turn pipeline
//! - `doctor` — Diagnose configuration and collaborator health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "palaver",
    about = "Palaver — session-aware chat front-end",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file if none exists
    Init,

    /// Start the bot
    Run {
        /// Path to the config file (defaults to ~/.palaver/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the store backend ("redis" or "memory")
        #[arg(long)]
        store: Option<String>,
    },

    /// Diagnose configuration and collaborator health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Run { config, store } => commands::run::run(config, store).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
