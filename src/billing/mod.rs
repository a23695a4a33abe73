//! Monthly billing job: stage a usage file, load it, report on it

pub mod config;
pub mod file;
pub mod model;
pub mod pricing;
pub mod processor;
pub mod skip;
pub mod tasklet;

#[cfg(feature = "sqlite")]
pub mod job;
#[cfg(feature = "sqlite")]
pub mod table;

pub use config::JobConfig;
pub use model::{BillingData, ReportingData};
pub use pricing::{FlakyPricingService, Pricing, PricingService};
pub use processor::BillingDataProcessor;

#[cfg(feature = "sqlite")]
pub use job::{BillingJobBuilder, JOB_NAME};
