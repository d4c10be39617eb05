use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MpesaError;

/// Daraja caps `AccountReference` at 12 characters.
pub const MAX_ACCOUNT_REFERENCE_LEN: usize = 12;
/// Daraja caps `TransactionDesc` at 13 characters.
pub const MAX_DESCRIPTION_LEN: usize = 13;

const EAT_OFFSET_SECS: i32 = 3 * 3600;

/// A validated request to push a payment prompt to a subscriber's handset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StkPushRequest {
    pub amount: i64,
    /// Already normalized MSISDN (`2547XXXXXXXX`).
    pub phone_number: String,
    pub account_reference: String,
    pub description: String,
}

impl StkPushRequest {
    pub fn new(
        amount: i64,
        phone_number: impl Into<String>,
        account_reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, MpesaError> {
        if amount <= 0 {
            return Err(MpesaError::InvalidAmount(amount));
        }

        let account_reference = account_reference.into();
        let reference_len = account_reference.chars().count();
        if reference_len == 0 || reference_len > MAX_ACCOUNT_REFERENCE_LEN {
            return Err(MpesaError::InvalidAccountReference(account_reference));
        }

        let description: String = description
            .into()
            .chars()
            .take(MAX_DESCRIPTION_LEN)
            .collect();

        Ok(Self {
            amount,
            phone_number: crate::phone::normalize_phone(&phone_number.into())?,
            account_reference,
            description,
        })
    }
}

/// Identifiers Daraja issues for an accepted push; the checkout id is the
/// join key for the asynchronous callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StkPushAccepted {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct StkPushPayload<'a> {
    pub business_short_code: &'a str,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: &'a str,
    pub amount: i64,
    pub party_a: &'a str,
    pub party_b: &'a str,
    pub phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    pub callback_url: &'a str,
    pub account_reference: &'a str,
    pub transaction_desc: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode")]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: Option<String>,
}

/// Error body Daraja returns alongside 4xx/5xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct DarajaErrorBody {
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl StkPushResponse {
    pub(crate) fn into_accepted(self) -> Result<StkPushAccepted, MpesaError> {
        let code = self.response_code.unwrap_or_default();
        if code != "0" {
            return Err(MpesaError::Provider {
                code,
                message: self
                    .response_description
                    .unwrap_or_else(|| "STK push was not accepted".to_string()),
            });
        }

        match (self.merchant_request_id, self.checkout_request_id) {
            (Some(merchant_request_id), Some(checkout_request_id)) => Ok(StkPushAccepted {
                merchant_request_id,
                checkout_request_id,
                customer_message: self.customer_message,
            }),
            _ => Err(MpesaError::Provider {
                code,
                message: "accepted response is missing request identifiers".to_string(),
            }),
        }
    }
}

/// `YYYYMMDDHHmmss` in East Africa Time, the clock Daraja validates against.
pub fn timestamp(now: DateTime<Utc>) -> String {
    let eat = FixedOffset::east_opt(EAT_OFFSET_SECS).expect("EAT offset is in range");
    now.with_timezone(&eat).format("%Y%m%d%H%M%S").to_string()
}

/// `base64(shortcode + passkey + timestamp)`.
pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}
