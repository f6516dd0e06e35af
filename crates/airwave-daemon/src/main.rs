mod cli;
mod commands;

use airwave_config::ConfigLoader;
use airwave_logging::init_logging;
use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new(&cli.config).load()?;
    init_logging(&config.logging)?;

    info!(config = %cli.config.display(), "Starting airwave");

    match cli.command {
        Command::Ingest { channel } => commands::ingest(&config, channel.as_deref()).await,
        Command::Compact { channel } => commands::compact(&config, &channel).await,
        Command::Reconcile { destination } => commands::reconcile(&config, destination).await,
    }
}
