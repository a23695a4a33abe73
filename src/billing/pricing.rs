//! Unit prices for data, calls and text messages

use crate::core::ItemError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Unit prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Price per unit of data
    #[serde(default = "default_data_price")]
    pub data: f64,

    /// Price per minute of call
    #[serde(default = "default_call_price")]
    pub call: f64,

    /// Price per text message
    #[serde(default = "default_sms_price")]
    pub sms: f64,
}

fn default_data_price() -> f64 {
    0.01
}

fn default_call_price() -> f64 {
    0.5
}

fn default_sms_price() -> f64 {
    0.1
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            data: default_data_price(),
            call: default_call_price(),
            sms: default_sms_price(),
        }
    }
}

/// Source of unit prices.
///
/// The data price lives behind a remote dependency and may fail transiently.
pub trait PricingService: Send + Sync {
    fn data_price(&self) -> Result<f64, ItemError>;

    fn call_price(&self) -> f64;

    fn sms_price(&self) -> f64;
}

/// Pricing service whose data price lookup fails at random
#[derive(Debug, Clone)]
pub struct FlakyPricingService {
    pricing: Pricing,
    failure_rate: f64,
}

impl FlakyPricingService {
    /// `failure_rate` is clamped to `[0, 1]`; NaN counts as zero
    pub fn new(pricing: Pricing, failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        Self {
            pricing,
            failure_rate,
        }
    }

    /// A service that never fails
    pub fn reliable(pricing: Pricing) -> Self {
        Self::new(pricing, 0.0)
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl PricingService for FlakyPricingService {
    fn data_price(&self) -> Result<f64, ItemError> {
        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(ItemError::transient("Error while retrieving data pricing"));
        }
        Ok(self.pricing.data)
    }

    fn call_price(&self) -> f64 {
        self.pricing.call
    }

    fn sms_price(&self) -> f64 {
        self.pricing.sms
    }
}
