use std::env;

use secrecy::SecretString;

use crate::error::MpesaError;

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

/// Path the provider posts STK results to, relative to the public callback base URL.
pub const CALLBACK_PATH: &str = "/mpesa-callback";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => SANDBOX_BASE_URL,
            MpesaEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl std::str::FromStr for MpesaEnvironment {
    type Err = MpesaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" | "live" => Ok(Self::Production),
            other => Err(MpesaError::InvalidConfig(format!(
                "MPESA_ENVIRONMENT must be 'sandbox' or 'production', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub shortcode: String,
    pub passkey: SecretString,
    /// Full URL the provider calls back, e.g. `https://isp.example/mpesa-callback`.
    pub callback_url: String,
    pub api_base_url: String,
    pub transaction_type: String,
}

impl MpesaConfig {
    pub fn from_env() -> Result<Self, MpesaError> {
        let consumer_key = required("MPESA_CONSUMER_KEY")?;
        let consumer_secret = SecretString::from(required("MPESA_CONSUMER_SECRET")?);
        let shortcode = required("MPESA_SHORTCODE")?;
        let passkey = SecretString::from(required("MPESA_PASSKEY")?);
        let callback_base = required("MPESA_CALLBACK_BASE_URL")?;

        if !(callback_base.starts_with("https://") || callback_base.starts_with("http://")) {
            return Err(MpesaError::InvalidConfig(format!(
                "MPESA_CALLBACK_BASE_URL '{callback_base}' must be an absolute http(s) URL"
            )));
        }

        let environment = match env::var("MPESA_ENVIRONMENT") {
            Ok(value) => value.parse()?,
            Err(_) => MpesaEnvironment::Sandbox,
        };

        let api_base_url = env::var("MPESA_API_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| environment.base_url().to_string());

        let transaction_type = env::var("MPESA_TRANSACTION_TYPE")
            .unwrap_or_else(|_| "CustomerPayBillOnline".to_string());

        Ok(Self {
            consumer_key,
            consumer_secret,
            shortcode,
            passkey,
            callback_url: callback_url(&callback_base),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            transaction_type,
        })
    }
}

fn required(name: &'static str) -> Result<String, MpesaError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(MpesaError::MissingConfig(name))
}

fn callback_url(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), CALLBACK_PATH)
}
