//! Shoal CLI - Command-line interface
//!
//! Runs the streaming gateway or converts torrent files offline.

mod commands;

use clap::Parser;
use shoal_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "shoal")]
#[command(about = "Proxy-aware torrent streaming gateway")]
#[command(version)]
struct Cli {
    /// Console log level
    #[arg(long, global = true, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the full trace log of the last run
    #[arg(long, global = true)]
    logs_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_path = init_tracing(cli.log_level.into(), cli.logs_dir.as_deref())?;
    tracing::info!(log = %log_path.display(), "Full trace log for this run");

    commands::handle_command(cli.command).await
}
