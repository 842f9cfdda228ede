mod commands;
mod render;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use icsync_core::SyncConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "icsync")]
#[command(about = "Mirror a remote iCalendar feed into a local calendar")]
struct Cli {
    /// Config file (default: ~/.config/icsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config template
    Init,
    Sync {
        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Ignore the ledger and reconcile every event from scratch
        #[arg(long)]
        full: bool,

        /// List every action, not just counts
        #[arg(short, long)]
        verbose: bool,

        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },
    Status {
        /// Number of recent runs to show
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Forget all sync state (calendar entries are left alone)
    Reset,
    /// Verify the ledger database
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => SyncConfig::config_path()?,
    };

    match cli.command {
        Commands::Init => commands::init::run(&config_path),
        Commands::Sync {
            dry_run,
            full,
            verbose,
            json,
        } => {
            let config = load_config(&config_path)?;
            commands::sync::run(config, dry_run, full, verbose, json).await
        }
        Commands::Status { limit } => commands::status::run(load_config(&config_path)?, limit),
        Commands::Reset => commands::reset::run(load_config(&config_path)?),
        Commands::Check => commands::check::run(load_config(&config_path)?),
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "icsync=info,icsync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: &std::path::Path) -> Result<SyncConfig> {
    if !path.exists() {
        anyhow::bail!(
            "No config found at {}.\n\n\
            Create one with:\n  \
            icsync init",
            path.display()
        );
    }

    Ok(SyncConfig::load(path)?)
}
