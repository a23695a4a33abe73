//! Billing total computation

use crate::billing::{
    model::{BillingData, ReportingData},
    pricing::PricingService,
};
use crate::core::{ItemError, ItemProcessor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// Computes each line's bill and drops those under the spending threshold
pub struct BillingDataProcessor {
    pricing: Arc<dyn PricingService>,
    spending_threshold: f64,
}

impl BillingDataProcessor {
    pub fn new(pricing: Arc<dyn PricingService>, spending_threshold: f64) -> Self {
        Self {
            pricing,
            spending_threshold,
        }
    }
}

#[async_trait]
impl ItemProcessor<BillingData, ReportingData> for BillingDataProcessor {
    async fn process(&self, item: &BillingData) -> Result<Option<ReportingData>, ItemError> {
        let data_price = self
            .pricing
            .data_price()
            .map_err(|e| e.with_input(format!("account {}", item.account_id)))?;

        let total = f64::from(item.data_usage) * data_price
            + f64::from(item.call_duration) * self.pricing.call_price()
            + f64::from(item.sms_count) * self.pricing.sms_price();

        if total < self.spending_threshold {
            trace!(account_id = item.account_id, total, "Below spending threshold");
            return Ok(None);
        }

        Ok(Some(ReportingData::new(item.clone(), total)))
    }
}
