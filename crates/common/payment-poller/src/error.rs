use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Invalid status endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Payment {0} does not exist")]
    NotFound(uuid::Uuid),

    #[error("Status endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Status request failed: {0}")]
    Http(#[from] reqwest::Error),
}
