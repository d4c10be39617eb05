use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::auth::{TokenCache, TokenResponse};
use crate::config::MpesaConfig;
use crate::error::MpesaError;
use crate::stk::{
    self, DarajaErrorBody, StkPushAccepted, StkPushPayload, StkPushRequest, StkPushResponse,
};

const OAUTH_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";

/// Something that can push a payment prompt to a subscriber.
///
/// Implemented by [`MpesaClient`]; tests substitute a scripted gateway.
pub trait StkPushGateway: Send + Sync + 'static {
    fn stk_push(
        &self,
        request: &StkPushRequest,
    ) -> impl Future<Output = Result<StkPushAccepted, MpesaError>> + Send;
}

pub struct MpesaClient {
    http: reqwest::Client,
    config: MpesaConfig,
    tokens: TokenCache,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Result<Self, MpesaError> {
        let http = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MpesaError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            tokens: TokenCache::new(),
        })
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    /// Returns a cached bearer token or exchanges the consumer credentials for a new one.
    pub async fn access_token(&self) -> Result<String, MpesaError> {
        if let Some(token) = self.tokens.get() {
            return Ok(token);
        }

        let url = format!("{}{}", self.config.api_base_url, OAUTH_PATH);
        let response = self
            .http
            .get(&url)
            .basic_auth(
                &self.config.consumer_key,
                Some(self.config.consumer_secret.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| MpesaError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MpesaError::Auth(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MpesaError::Auth(format!("Malformed token response: {e}")))?;

        if token.access_token.is_empty() {
            return Err(MpesaError::Auth("Empty access_token in response".into()));
        }

        debug!(lifetime_secs = token.lifetime().as_secs(), "Obtained M-Pesa access token");
        self.tokens
            .store(token.access_token.clone(), token.lifetime());

        Ok(token.access_token)
    }

    async fn send_stk_push(&self, request: &StkPushRequest) -> Result<StkPushAccepted, MpesaError> {
        let token = self.access_token().await?;

        let timestamp = stk::timestamp(Utc::now());
        let password = stk::password(
            &self.config.shortcode,
            self.config.passkey.expose_secret(),
            &timestamp,
        );

        let payload = StkPushPayload {
            business_short_code: &self.config.shortcode,
            password,
            timestamp,
            transaction_type: &self.config.transaction_type,
            amount: request.amount,
            party_a: &request.phone_number,
            party_b: &self.config.shortcode,
            phone_number: &request.phone_number,
            callback_url: &self.config.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: &request.description,
        };

        let url = format!("{}{}", self.config.api_base_url, STK_PUSH_PATH);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token revoked early; the next initiation re-authenticates.
            self.tokens.clear();
        }

        if let Ok(parsed) = serde_json::from_str::<StkPushResponse>(&body)
            && parsed.response_code.is_some()
        {
            return parsed.into_accepted();
        }

        if let Ok(error) = serde_json::from_str::<DarajaErrorBody>(&body)
            && (error.error_code.is_some() || error.error_message.is_some())
        {
            return Err(MpesaError::Provider {
                code: error.error_code.unwrap_or_else(|| status.as_u16().to_string()),
                message: error.error_message.unwrap_or_default(),
            });
        }

        warn!(%status, "Unrecognised STK push response");
        Err(MpesaError::Provider {
            code: status.as_u16().to_string(),
            message: body,
        })
    }
}

impl StkPushGateway for MpesaClient {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAccepted, MpesaError> {
        self.send_stk_push(request).await
    }
}
