use axum::http::HeaderValue;
use chrono::TimeDelta;

use crate::error::PaymentError;

const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_PENDING_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Browser origins allowed to call the payment routes.
    pub allowed_origins: Vec<HeaderValue>,
    /// How long a payment may stay `pending` before the reaper fails it.
    pub pending_payment_ttl: TimeDelta,
    /// `TransactionDesc` shown on the subscriber's handset.
    pub transaction_description: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![HeaderValue::from_static(DEFAULT_ALLOWED_ORIGIN)],
            pending_payment_ttl: TimeDelta::hours(DEFAULT_PENDING_TTL_HOURS),
            transaction_description: "Internet plan".to_string(),
        }
    }
}

impl PaymentConfig {
    pub fn from_env() -> Result<Self, PaymentError> {
        let defaults = Self::default();

        let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
            Ok(raw) => parse_origins(&raw)?,
            Err(_) => defaults.allowed_origins,
        };

        let pending_payment_ttl = match std::env::var("PENDING_PAYMENT_TTL_HOURS") {
            Ok(raw) => parse_ttl_hours(&raw)?,
            Err(_) => defaults.pending_payment_ttl,
        };

        let transaction_description = std::env::var("MPESA_TRANSACTION_DESC")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.transaction_description);

        Ok(Self {
            allowed_origins,
            pending_payment_ttl,
            transaction_description,
        })
    }
}

fn parse_origins(raw: &str) -> Result<Vec<HeaderValue>, PaymentError> {
    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|e| {
                PaymentError::Config(format!(
                    "CORS_ALLOWED_ORIGINS entry '{origin}' is not a valid header value: {e}"
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if origins.is_empty() {
        return Err(PaymentError::Config(
            "CORS_ALLOWED_ORIGINS must list at least one origin".into(),
        ));
    }

    Ok(origins)
}

fn parse_ttl_hours(raw: &str) -> Result<TimeDelta, PaymentError> {
    let hours: i64 = raw.trim().parse().map_err(|_| {
        PaymentError::Config(format!(
            "PENDING_PAYMENT_TTL_HOURS must be a whole number of hours, got '{raw}'"
        ))
    })?;

    if hours <= 0 {
        return Err(PaymentError::Config(
            "PENDING_PAYMENT_TTL_HOURS must be positive".into(),
        ));
    }

    Ok(TimeDelta::hours(hours))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        let origins = parse_origins("https://portal.example.net, http://localhost:5173 ,").unwrap();
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://portal.example.net");
        assert_eq!(origins[1], "http://localhost:5173");
    }

    #[test]
    fn empty_origin_list_is_rejected() {
        assert!(matches!(parse_origins(" , "), Err(PaymentError::Config(_))));
    }

    #[test]
    fn ttl_must_be_positive_hours() {
        assert_eq!(parse_ttl_hours("48").unwrap(), TimeDelta::hours(48));
        assert!(parse_ttl_hours("0").is_err());
        assert!(parse_ttl_hours("a day").is_err());
    }
}
