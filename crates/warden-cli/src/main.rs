//! Warden CLI
//!
//! Command-line interface for Warden access-control administration.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use warden_cli::{Cli, WardenConfig, commands};
use warden_core::ConfigManager;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = WardenConfig::load(cli.config.as_deref())?;

    let default_level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?cli.config, "Starting warden");

    let output = commands::run(&cli.command, &config, cli.config.as_deref()).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
