use be_remote_db::{PaymentStatus, SortOrder};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentRequest {
    pub user_id: String,
    pub phone: String,
    pub amount: Option<i64>,
    pub plan_id: Option<Uuid>,
    pub account_reference: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub success: bool,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub payment_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackAck {
    pub status: String,
}

impl CallbackAck {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub mpesa_receipt_number: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentHistoryQuery {
    pub user_id: String,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Deserialize)]
pub struct ActivateSubscriptionRequest {
    pub user_id: String,
    pub plan_id: Uuid,
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ActivateSubscriptionResponse {
    pub subscription_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created: bool,
}
