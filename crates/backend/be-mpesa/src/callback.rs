//! STK push result callback envelope.
//!
//! ```json
//! { "Body": { "stkCallback": {
//!     "MerchantRequestID": "...", "CheckoutRequestID": "...",
//!     "ResultCode": 0, "ResultDesc": "...",
//!     "CallbackMetadata": { "Item": [{ "Name": "Amount", "Value": 1 }] }
//! }}}
//! ```

use serde::{Deserialize, Serialize};

/// Result code Daraja sends for a completed payment.
pub const RESULT_SUCCESS: i64 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<MetadataValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(serde_json::Number),
    Text(String),
}

impl MetadataValue {
    /// Text form; whole numbers render without a fractional part.
    pub fn to_text(&self) -> String {
        match self {
            MetadataValue::Text(s) => s.clone(),
            MetadataValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => i.to_string(),
                (_, Some(u), _) => u.to_string(),
                (_, _, Some(f)) if f.fract() == 0.0 => format!("{f:.0}"),
                _ => n.to_string(),
            },
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64)),
            MetadataValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
            }
        }
    }
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_SUCCESS
    }

    /// Looks up a metadata value by name; Daraja does not guarantee item order.
    pub fn metadata(&self, name: &str) -> Option<&MetadataValue> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
            .and_then(|item| item.value.as_ref())
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.metadata("MpesaReceiptNumber")
            .map(MetadataValue::to_text)
            .filter(|s| !s.is_empty())
    }

    pub fn confirmed_amount(&self) -> Option<i64> {
        self.metadata("Amount").and_then(MetadataValue::to_i64)
    }

    pub fn confirmed_phone(&self) -> Option<String> {
        self.metadata("PhoneNumber").map(MetadataValue::to_text)
    }

    pub fn transaction_date(&self) -> Option<String> {
        self.metadata("TransactionDate").map(MetadataValue::to_text)
    }
}

impl CallbackEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn into_callback(self) -> StkCallback {
        self.body.stk_callback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_body() -> serde_json::Value {
        serde_json::json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": { "Item": [
                    { "Name": "PhoneNumber", "Value": 254712345678u64 },
                    { "Name": "Balance" },
                    { "Name": "Amount", "Value": 1000.0 },
                    { "Name": "TransactionDate", "Value": 20191219102115u64 },
                    { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" }
                ]}
            }}
        })
    }

    #[test]
    fn metadata_is_matched_by_name_not_position() {
        let callback = CallbackEnvelope::from_slice(success_body().to_string().as_bytes())
            .unwrap()
            .into_callback();

        assert!(callback.is_success());
        assert_eq!(callback.receipt_number().as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(callback.confirmed_amount(), Some(1000));
        assert_eq!(callback.confirmed_phone().as_deref(), Some("254712345678"));
        assert_eq!(callback.transaction_date().as_deref(), Some("20191219102115"));
    }

    #[test]
    fn cancelled_callback_has_no_metadata() {
        let body = serde_json::json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }}
        });
        let callback = CallbackEnvelope::from_slice(body.to_string().as_bytes())
            .unwrap()
            .into_callback();

        assert!(!callback.is_success());
        assert_eq!(callback.result_code, 1032);
        assert_eq!(callback.receipt_number(), None);
        assert_eq!(callback.confirmed_amount(), None);
    }

    #[test]
    fn missing_stk_callback_is_a_parse_error() {
        assert!(CallbackEnvelope::from_slice(br#"{"Body":{}}"#).is_err());
        assert!(CallbackEnvelope::from_slice(b"not json").is_err());
    }
}
