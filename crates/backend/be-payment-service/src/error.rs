use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use be_mpesa::MpesaError;
use be_remote_db::DbError;
use be_subscription::SubscriptionError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Db(#[from] DbError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl From<MpesaError> for PaymentError {
    fn from(err: MpesaError) -> Self {
        if err.is_validation() {
            PaymentError::Validation(err.to_string())
        } else if err.is_config() {
            PaymentError::Config(err.to_string())
        } else {
            PaymentError::Provider(err.to_string())
        }
    }
}

impl From<SubscriptionError> for PaymentError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::PlanNotFound(_) => PaymentError::NotFound(err.to_string()),
            SubscriptionError::InvalidPlan { .. } => PaymentError::Validation(err.to_string()),
            SubscriptionError::Db(db) => PaymentError::Db(db),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PaymentError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            PaymentError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            PaymentError::Db(e) if e.is_not_found() => (StatusCode::NOT_FOUND, e.to_string()),
            PaymentError::Provider(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            PaymentError::Config(_) | PaymentError::Db(_) | PaymentError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %self, "Payment service error");
        } else {
            tracing::warn!(%status, error = %self, "Payment request rejected");
        }

        (
            status,
            axum::Json(ErrorBody {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpesa_errors_map_to_taxonomy() {
        assert!(matches!(
            PaymentError::from(MpesaError::InvalidPhone("123".into())),
            PaymentError::Validation(_)
        ));
        assert!(matches!(
            PaymentError::from(MpesaError::MissingConfig("MPESA_PASSKEY")),
            PaymentError::Config(_)
        ));
        assert!(matches!(
            PaymentError::from(MpesaError::Provider {
                code: "1".into(),
                message: "Rejected".into()
            }),
            PaymentError::Provider(_)
        ));
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (PaymentError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (PaymentError::NotFound("plan".into()), StatusCode::NOT_FOUND),
            (
                PaymentError::Db(DbError::not_found("payment")),
                StatusCode::NOT_FOUND,
            ),
            (PaymentError::Provider("down".into()), StatusCode::BAD_GATEWAY),
            (
                PaymentError::Config("missing".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
