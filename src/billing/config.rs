//! Billing job configuration

use crate::billing::pricing::Pricing;
use crate::core::{config::ChunkStepConfig, ErrorKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Billing job configuration, loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Directory the input file is staged into
    pub staging_dir: PathBuf,

    /// Database holding BILLING_DATA and, unless overridden, the job history
    pub database_url: Option<String>,

    /// Flat file to BILLING_DATA
    pub ingestion: ChunkStepConfig,

    /// BILLING_DATA to report file
    pub report: ChunkStepConfig,

    /// Unit prices
    pub pricing: Pricing,

    /// Probability that one data price lookup fails
    pub pricing_failure_rate: f64,

    /// Lines billed below this total are left out of the report
    pub spending_threshold: f64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("staging"),
            database_url: None,
            ingestion: ChunkStepConfig::default().with_skip(ErrorKind::Parse, 10),
            report: ChunkStepConfig::default()
                .with_retry(ErrorKind::TransientDependency, 100)
                .with_skip(ErrorKind::TransientDependency, 10),
            pricing: Pricing::default(),
            pricing_failure_rate: 1.0 / 7.0,
            spending_threshold: 150.0,
        }
    }
}

impl JobConfig {
    /// Load job configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse job configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: JobConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the job configuration
    pub fn validate(&self) -> Result<()> {
        self.ingestion.validate("fileIngestion")?;
        self.report.validate("reportGeneration")?;

        if !(0.0..=1.0).contains(&self.pricing_failure_rate) {
            anyhow::bail!(
                "pricing_failure_rate must be between 0 and 1, got {}",
                self.pricing_failure_rate
            );
        }

        for (name, price) in [
            ("data", self.pricing.data),
            ("call", self.pricing.call),
            ("sms", self.pricing.sms),
        ] {
            if !price.is_finite() || price < 0.0 {
                anyhow::bail!("pricing.{} must be a non-negative number, got {}", name, price);
            }
        }

        if !self.spending_threshold.is_finite() {
            anyhow::bail!("spending_threshold must be a number");
        }

        if self.staging_dir.as_os_str().is_empty() {
            anyhow::bail!("staging_dir must not be empty");
        }

        Ok(())
    }
}
