//! Payment domain events.
//!
//! Amounts are in major units of `currency`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiated {
    pub payment_id: String,
    pub user_id: String,
    pub course_id: String,
    pub amount: f64,
    pub currency: String,
    /// Payment provider name, e.g. `stripe`.
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompleted {
    pub payment_id: String,
    pub user_id: String,
    pub course_id: String,
    pub amount: f64,
    pub currency: String,
    /// Provider-side transaction reference.
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub payment_id: String,
    pub user_id: String,
    pub course_id: String,
    pub amount: f64,
    pub currency: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRefunded {
    pub payment_id: String,
    pub user_id: String,
    pub course_id: String,
    pub amount: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

domain_event!(PaymentInitiated => super::event_types::PAYMENT_INITIATED);
domain_event!(PaymentCompleted => super::event_types::PAYMENT_COMPLETED);
domain_event!(PaymentFailed => super::event_types::PAYMENT_FAILED);
domain_event!(PaymentRefunded => super::event_types::PAYMENT_REFUNDED);
