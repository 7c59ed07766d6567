//! Command-line interface for the music catalog.
//!
//! Subcommands map one-to-one onto the pipeline passes plus the store
//! maintenance operations.

mod commands;

pub use commands::{Cli, Commands, run_command};
