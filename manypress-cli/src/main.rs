//! manypress — publish static sites over HTTP, IPFS, Hyper and BitTorrent.
//!
//! # Usage
//!
//! ```text
//! manypress run [--config <path>]
//! manypress site create <domain> [--http] [--ipfs] [--hyper] [--bittorrent] [--public]
//! manypress site list [--public-only]
//! manypress site show <domain>
//! manypress site sync <domain> <folder>
//! manypress site delete <domain>
//! manypress site stats <domain>
//! ```

mod app;
mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::site::SiteCommand;
use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "manypress",
    version,
    about = "Publish static sites over HTTP, IPFS, Hyper and BitTorrent",
    long_about = None,
)]
struct Cli {
    /// Config file path (default: ~/.manypress/config.yml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load every protocol backend and serve DNS until interrupted.
    Run,

    /// Manage site records.
    Site {
        #[command(subcommand)]
        command: SiteCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => commands::run::run(config).await,
        Commands::Site { command } => command.run(config).await,
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
