//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, RunCommand, ShowCommand, ValidateCommand};
use std::ffi::OsString;

/// Monthly billing batch job
#[derive(Debug, Parser, Clone)]
#[command(name = "billing-batch")]
#[command(version)]
#[command(about = "Chunk-oriented batch runner for the monthly billing job", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Launch or restart the billing job
    Run(RunCommand),

    /// Show execution history
    History(HistoryCommand),

    /// Show one execution with its steps
    Show(ShowCommand),

    /// Validate a job configuration file
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
