//! # Catalog Harvest CLI (`harvest`)
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the catalog database and schema |
//! | `harvest sources` | List harvesters, their health and record counts |
//! | `harvest run <spec>` | Harvest `all`, a type, or `type:name` |
//! | `harvest records <spec>` | List records owned by a harvester |
//!
//! Logs go to stderr and are filtered with `RUST_LOG`
//! (default `catalog_harvest=info`). Run summaries go to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use catalog_harvest::progress::ProgressMode;
use catalog_harvest::{config, harvest, migrate, records, sources};

/// Keep a metadata catalog in sync with directories of metadata documents.
#[derive(Parser)]
#[command(name = "harvest", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the catalog database. Safe to run more than once.
    Init,

    /// List configured harvesters and their status.
    Sources,

    /// Run one or more harvesters.
    ///
    /// Harvester format: `all`, `filesystem`, or `filesystem:<name>`.
    Run {
        harvester: String,

        /// Walk and classify only; the catalog is not touched.
        #[arg(long)]
        dry_run: bool,

        /// Print one JSON object per harvester instead of the text summary.
        #[arg(long)]
        json: bool,

        /// Progress reporting on stderr. Defaults to `log` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// List records owned by a harvester.
    Records { harvester: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("catalog_harvest=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Run {
            harvester,
            dry_run,
            json,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            harvest::run_harvest_command(&cfg, &harvester, dry_run, json, progress).await?;
        }
        Commands::Records { harvester } => {
            records::run_records(&cfg, &harvester).await?;
        }
    }

    Ok(())
}
