//! Billing job assembly

use crate::billing::{
    config::JobConfig,
    file::{BillingFileReader, FileLocation, ReportFileWriter},
    pricing::{FlakyPricingService, PricingService},
    processor::BillingDataProcessor,
    skip::SkipFileListener,
    table::{BillingTableReader, BillingTableWriter},
    tasklet::FilePreparationTasklet,
};
use crate::core::{JobParameters, PassThroughProcessor};
use crate::execution::{ChunkStep, Job, Step};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

pub const JOB_NAME: &str = "BillingJob";

pub const FILE_PREPARATION_STEP: &str = "filePreparation";
pub const FILE_INGESTION_STEP: &str = "fileIngestion";
pub const REPORT_GENERATION_STEP: &str = "reportGeneration";

pub const REQUIRED_PARAMETERS: [&str; 4] = ["input.file", "output.file", "data.year", "data.month"];

/// Builds the three-step billing job
pub struct BillingJobBuilder<'a> {
    config: &'a JobConfig,
    pool: SqlitePool,
    pricing: Option<Arc<dyn PricingService>>,
}

impl<'a> BillingJobBuilder<'a> {
    pub fn new(config: &'a JobConfig, pool: SqlitePool) -> Self {
        Self {
            config,
            pool,
            pricing: None,
        }
    }

    /// Replace the configured pricing service
    pub fn pricing(mut self, pricing: Arc<dyn PricingService>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Assemble the job; `parameters` supply the optional skip file
    pub fn build(self, parameters: &JobParameters) -> Job {
        let config = self.config;
        let pricing = self.pricing.unwrap_or_else(|| {
            Arc::new(FlakyPricingService::new(
                config.pricing,
                config.pricing_failure_rate,
            ))
        });
        let skip_file = parameters.get_string("skip.file").map(PathBuf::from);

        let ingestion = ChunkStep::new(
            BillingFileReader::new(FileLocation::StagedParameter {
                parameter: "input.file".to_string(),
                dir: config.staging_dir.clone(),
            }),
            PassThroughProcessor::new(),
            BillingTableWriter::new(self.pool.clone()),
        )
        .with_config(&config.ingestion)
        .listener(SkipFileListener::new(skip_file));

        let report = ChunkStep::new(
            BillingTableReader::new(self.pool),
            BillingDataProcessor::new(pricing, config.spending_threshold),
            ReportFileWriter::new(FileLocation::Parameter("output.file".to_string())),
        )
        .with_config(&config.report);

        REQUIRED_PARAMETERS.iter().fold(
            Job::new(JOB_NAME)
                .step(Step::tasklet(
                    FILE_PREPARATION_STEP,
                    FilePreparationTasklet::new(config.staging_dir.clone()),
                ))
                .step(Step::chunk(FILE_INGESTION_STEP, ingestion))
                .step(Step::chunk(REPORT_GENERATION_STEP, report)),
            |job, name| job.require_parameter(*name),
        )
    }
}
