mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "calsync")]
#[command(version)]
#[command(about = "Aggregate event listings into confirmed and possible CalDAV calendars")]
struct Cli {
    /// Config file (default: ~/.config/calsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every enabled source and reconcile both calendars
    Sync {
        /// Reconcile into an in-memory store instead of the CalDAV server
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the config file and real environment still apply
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync { dry_run } => {
            let report = commands::sync::run(&config, dry_run).await?;
            println!("{}", report);
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default: info).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
