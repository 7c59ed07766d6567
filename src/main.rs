//! Music catalog - NAS music library inventory.
//!
//! A three-pass pipeline over large FLAC/DSF libraries: a fast
//! header-probe walk, a stat-only change reconciliation, and a deep tag
//! extraction pass, all backed by a SQLite catalog with a single-writer
//! architecture.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod model;
pub mod pipeline;
pub mod probe;
pub mod status;
#[cfg(test)]
pub mod test_utils;
pub mod walker;
pub mod writer;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("mc=info".parse().unwrap()))
        .init();

    cli::run_command(&args)
}
