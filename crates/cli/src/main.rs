//! Tutorbot CLI — the main entry point.
//!
//! Commands:
//! - `run`          — Start the bot (poll Telegram, relay to Gemini)
//! - `check-config` — Load and validate the configuration, then exit

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod app;

#[derive(Parser)]
#[command(
    name = "tutorbot",
    about = "Telegram study-tutor bot backed by Gemini",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = "tutorbot.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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
        Commands::Run => app::run(&cli.config).await?,
        Commands::CheckConfig => app::check_config(&cli.config)?,
    }

    Ok(())
}
