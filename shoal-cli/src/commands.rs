//! CLI command implementations

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use shoal_core::config::ShoalConfig;
use shoal_core::metainfo::torrent_to_magnet;
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming gateway
    Server {
        /// Address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Directory engines write content into
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Settings file
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Static browser client directory
        #[arg(long)]
        client_dir: Option<PathBuf>,
    },
    /// Print the magnet URI for a .torrent file
    Convert {
        /// Path to the torrent file
        file: PathBuf,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the failure of the command that ran
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Server {
            bind,
            data_dir,
            settings,
            client_dir,
        } => {
            let mut config = ShoalConfig::from_env();
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            if let Some(dir) = data_dir {
                config.server.data_dir = dir;
            }
            if let Some(path) = settings {
                config.server.settings_path = path;
            }
            if let Some(dir) = client_dir {
                config.server.client_dir = dir;
            }
            start_server(config).await
        }
        Commands::Convert { file } => {
            let magnet = convert_file(&file).await?;
            println!("{magnet}");
            Ok(())
        }
    }
}

/// Run the gateway until interrupted.
///
/// # Errors
/// Settings corruption or listener failures stop startup
pub async fn start_server(config: ShoalConfig) -> anyhow::Result<()> {
    info!(
        bind = %config.server.bind_addr,
        settings = %config.server.settings_path.display(),
        "Starting Shoal gateway"
    );
    shoal_web::run_server(config)
        .await
        .context("Gateway stopped with an error")
}

/// Reads a torrent file and builds its magnet URI.
///
/// # Errors
/// File unreadable or not a valid torrent
pub async fn convert_file(path: &Path) -> anyhow::Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let magnet = torrent_to_magnet(&bytes)
        .with_context(|| format!("Invalid torrent file {}", path.display()))?;
    Ok(magnet)
}
