//! Billing records

use serde::{Deserialize, Serialize};

/// Monthly usage of one phone line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingData {
    pub data_year: i32,
    pub data_month: i32,
    pub account_id: i64,
    pub phone_number: String,
    pub data_usage: f32,
    pub call_duration: i32,
    pub sms_count: i32,
}

impl BillingData {
    /// Number of fields in a flat-file record
    pub const FIELD_COUNT: usize = 7;

    /// Fields in flat-file order
    pub fn to_fields(&self) -> [String; Self::FIELD_COUNT] {
        [
            self.data_year.to_string(),
            self.data_month.to_string(),
            self.account_id.to_string(),
            self.phone_number.clone(),
            self.data_usage.to_string(),
            self.call_duration.to_string(),
            self.sms_count.to_string(),
        ]
    }
}

/// A billing record with its computed total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingData {
    pub billing_data: BillingData,
    pub billing_total: f64,
}

impl ReportingData {
    pub fn new(billing_data: BillingData, billing_total: f64) -> Self {
        Self {
            billing_data,
            billing_total,
        }
    }
}
