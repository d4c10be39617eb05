use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::PollError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Payment status as reported by `GET /payment/{id}/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusSnapshot {
    pub status: RemoteStatus,
    #[serde(default)]
    pub mpesa_receipt_number: Option<String>,
}

impl StatusSnapshot {
    pub fn new(status: RemoteStatus) -> Self {
        Self {
            status,
            mpesa_receipt_number: None,
        }
    }
}

/// Where the poller reads payment status from.
pub trait PaymentStatusSource: Send + Sync {
    fn fetch_status(
        &self,
        payment_id: Uuid,
    ) -> impl Future<Output = Result<StatusSnapshot, PollError>> + Send;
}

/// Reads status from the billing backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStatusSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStatusSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PollError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(PollError::InvalidEndpoint(base_url));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { http, base_url })
    }

    fn status_url(&self, payment_id: Uuid) -> String {
        format!("{}/payment/{payment_id}/status", self.base_url)
    }
}

impl PaymentStatusSource for HttpStatusSource {
    async fn fetch_status(&self, payment_id: Uuid) -> Result<StatusSnapshot, PollError> {
        let response = self.http.get(self.status_url(payment_id)).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PollError::NotFound(payment_id));
        }
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }

        Ok(response.json::<StatusSnapshot>().await?)
    }
}
