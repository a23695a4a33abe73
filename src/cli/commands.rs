//! CLI command definitions

use crate::core::{parameters::parse_parameter, JobParameter, JobParameters};
use clap::Args;
use std::path::PathBuf;

/// Launch or restart the billing job
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Job parameters (name=value, name:int=value, name:date=YYYY-MM-DD)
    #[arg(short, long, value_parser = parse_parameter)]
    pub param: Vec<(String, JobParameter)>,

    /// Path to job configuration YAML file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Database URL for billing data and job history
    #[arg(long)]
    pub db: Option<String>,

    /// Keep job history in memory only
    #[arg(long)]
    pub no_history: bool,
}

impl RunCommand {
    /// Collect the parameters in command-line order
    pub fn parameters(&self) -> JobParameters {
        self.param
            .iter()
            .cloned()
            .fold(JobParameters::builder(), |builder, (name, value)| {
                builder.add(name, value)
            })
            .build()
    }
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Job name to filter by
    #[arg(short, long)]
    pub job: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Database URL
    #[arg(long)]
    pub db: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show one execution
#[derive(Debug, Args, Clone)]
pub struct ShowCommand {
    /// Job execution ID
    pub execution_id: String,

    /// Database URL
    #[arg(long)]
    pub db: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a job configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to job configuration YAML file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Print the effective configuration as JSON
    #[arg(long)]
    pub json: bool,
}
