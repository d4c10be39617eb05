use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "ASC"),
            SortOrder::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationParams {
    offset: u32,
    limit: u32,
    order: SortOrder,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self::new(0, 20, SortOrder::Desc)
    }
}

impl PaginationParams {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(offset: u32, limit: u32, order: SortOrder) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
            order,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset as i64
    }

    pub fn limit(&self) -> i64 {
        self.limit as i64
    }

    pub fn order(&self) -> &SortOrder {
        &self.order
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Mpesa,
    Cash,
    BankTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    /// `success` and `failed` are final; nothing moves a payment out of them.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub speed_limit: Option<String>,
    pub validity_days: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: String,
    pub plan_id: Option<Uuid>,
    pub amount: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    pub phone_number: Option<String>,
    pub account_reference: Option<String>,
    pub result_code: Option<i32>,
    pub result_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Fields for a freshly initiated STK push, persisted as `pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub user_id: String,
    pub plan_id: Option<Uuid>,
    pub amount: i64,
    pub method: PaymentMethod,
    pub phone_number: String,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub account_reference: String,
}

/// Terminal result applied to a `pending` payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettlement {
    pub checkout_request_id: String,
    pub status: PaymentStatus,
    pub mpesa_receipt_number: Option<String>,
    pub result_code: i32,
    pub result_description: String,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: String,
    pub plan_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: SubscriptionStatus,
    pub auto_renew: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    pub user_id: String,
    pub plan_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub auto_renew: bool,
}

/// A subscription moved to `expired` by the sweep, joined with its plan name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExpiredSubscription {
    pub id: Uuid,
    pub user_id: String,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: String,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditLog {
    pub user_id: String,
    pub action: String,
    pub details: serde_json::Value,
}

impl NewAuditLog {
    pub fn new(
        user_id: impl Into<String>,
        action: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            action: action.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ErrorLog {
    pub id: Uuid,
    pub source: String,
    pub kind: String,
    pub message: String,
    pub payload: Option<serde_json::Value>,
    pub source_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewErrorLog {
    pub source: String,
    pub kind: String,
    pub message: String,
    pub payload: Option<serde_json::Value>,
    pub source_ip: Option<String>,
}
