//! zoneplace: replica placement from the command line.
//!
//! # Usage
//!
//! ```text
//! zoneplace place --config fleet.toml --data-dir /var/lib/zoneplace
//! zoneplace state --data-dir /var/lib/zoneplace
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "zoneplace",
    about = "Replication zone placement",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a fleet file and run a placement round.
    ///
    /// Nodes and databases that already exist in the store are skipped, so
    /// the same file can be applied repeatedly as it grows.
    Place {
        /// Fleet file (TOML).
        #[arg(short, long)]
        config: PathBuf,
        /// Directory holding the state store. In-memory when omitted.
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print the stored topology and placement views.
    State {
        #[arg(long)]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,zoneplace=debug"))?,
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Place {
            config,
            data_dir,
            format,
        } => commands::place::run(&config, data_dir.as_deref(), &format).await,
        Command::State { data_dir } => commands::state::run(&data_dir),
    }
}
