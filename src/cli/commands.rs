//! CLI command definitions and handlers.
//!
//! Each subcommand is implemented as a function that takes the parsed
//! arguments and returns an `anyhow::Result<()>`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db;
use crate::pipeline::{run_changed, run_deep, run_fast};
use crate::status;

/// Music catalog CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "MUSIC_CATALOG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and apply pending schema migrations
    Migrate,
    /// Full walk: discover albums and header-probe every track
    Fast {
        /// Probe worker count (defaults to config)
        #[arg(long)]
        workers: Option<usize>,
        /// Intents per store transaction (defaults to config)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Stat-only reconciliation against stored fingerprints
    Changed {
        /// Ignore files modified within this many seconds (defaults to config)
        #[arg(long)]
        debounce_secs: Option<u64>,
    },
    /// Full tag extraction for the dirty queue
    Deep {
        /// Maximum tracks this run, 0 for no limit
        #[arg(long, default_value_t = 0)]
        limit: u32,
    },
    /// Catalog health summary
    Status {
        /// Recent-activity window in hours
        #[arg(long, default_value_t = 24)]
        window_hours: u64,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Delete catalog rows, keeping the schema and the run ledger
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Delete the store files entirely and recreate an empty schema
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Run the parsed CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Migrate => cmd_migrate(&rt, &config),
        Commands::Fast {
            workers,
            batch_size,
        } => cmd_fast(&rt, config, *workers, *batch_size),
        Commands::Changed { debounce_secs } => cmd_changed(&rt, config, *debounce_secs),
        Commands::Deep { limit } => cmd_deep(&rt, config, *limit),
        Commands::Status {
            window_hours,
            format,
        } => cmd_status(&rt, &config, *window_hours, *format),
        Commands::Clear { yes } => cmd_clear(&rt, &config, *yes),
        Commands::Reset { yes } => cmd_reset(&rt, &config, *yes),
    }
}

// ============================================================================
// Individual command implementations
// ============================================================================

fn cmd_migrate(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = db::init_db(&db::db_url(&config.db_path)).await?;
        pool.close().await;
        println!("Schema up to date at {}", config.db_path.display());
        Ok(())
    })
}

fn cmd_fast(
    rt: &Runtime,
    mut config: Config,
    workers: Option<usize>,
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    if let Some(batch_size) = batch_size {
        config.inventory.batch_size = batch_size;
    }
    let workers = workers.unwrap_or(config.inventory.workers);

    rt.block_on(async {
        let pool = db::init_db(&db::db_url(&config.db_path)).await?;
        let summary = run_fast(&pool, &config, workers).await?;
        println!(
            "Fast pass done: {} tracks in {} ms (run #{})",
            summary.processed, summary.duration_ms, summary.run_id
        );
        Ok(())
    })
}

fn cmd_changed(rt: &Runtime, config: Config, debounce_secs: Option<u64>) -> anyhow::Result<()> {
    let debounce_secs = debounce_secs.unwrap_or(config.inventory.debounce_secs);
    rt.block_on(async {
        let pool = db::init_db(&db::db_url(&config.db_path)).await?;
        let summary = run_changed(&pool, &config, debounce_secs).await?;
        println!(
            "Changed pass done: {} changes in {} ms (run #{})",
            summary.processed, summary.duration_ms, summary.run_id
        );
        Ok(())
    })
}

fn cmd_deep(rt: &Runtime, config: Config, limit: u32) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = db::init_db(&db::db_url(&config.db_path)).await?;
        let summary = run_deep(&pool, &config, limit).await?;
        println!(
            "Deep pass done: {} tracks tagged, {} rejected, {} ms (run #{})",
            summary.processed, summary.rejected, summary.duration_ms, summary.run_id
        );
        Ok(())
    })
}

fn cmd_status(
    rt: &Runtime,
    config: &Config,
    window_hours: u64,
    format: OutputFormat,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = db::init_db(&db::db_url(&config.db_path)).await?;
        let report = status::collect(&pool, window_hours).await?;
        match format {
            OutputFormat::Text => print!("{}", report.render_text()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        Ok(())
    })
}

fn cmd_clear(rt: &Runtime, config: &Config, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("clear deletes all catalog rows; pass --yes to confirm");
    }
    rt.block_on(async {
        let pool = db::init_db(&db::db_url(&config.db_path)).await?;
        db::soft_clear(&pool).await?;
        println!("Catalog cleared (run ledger kept)");
        Ok(())
    })
}

fn cmd_reset(rt: &Runtime, config: &Config, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("reset deletes the database files; pass --yes to confirm");
    }
    db::hard_reset(&config.db_path)?;
    rt.block_on(async {
        let pool = db::init_db(&db::db_url(&config.db_path)).await?;
        pool.close().await;
        println!("Store reset at {}", config.db_path.display());
        Ok(())
    })
}
