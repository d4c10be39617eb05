#[derive(Debug, thiserror::Error)]
pub enum MpesaError {
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("Invalid account reference: {0}")]
    InvalidAccountReference(String),

    #[error("{0} environment variable must be set")]
    MissingConfig(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to obtain access token: {0}")]
    Auth(String),

    #[error("M-Pesa rejected the request ({code}): {message}")]
    Provider { code: String, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MpesaError {
    /// Input errors the caller can fix by resubmitting different values.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPhone(_) | Self::InvalidAmount(_) | Self::InvalidAccountReference(_)
        )
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::MissingConfig(_) | Self::InvalidConfig(_))
    }

    /// Short, stable label used for analytics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPhone(_) => "invalid_phone",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidAccountReference(_) => "invalid_account_reference",
            Self::MissingConfig(_) | Self::InvalidConfig(_) => "config",
            Self::Auth(_) => "auth",
            Self::Provider { .. } => "provider",
            Self::Http(_) => "http",
        }
    }
}
