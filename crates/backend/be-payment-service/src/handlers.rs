use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use be_mpesa::StkPushGateway;
use be_remote_db::{PaginationParams, Payment, PaymentStatus, Plan};
use tracing::info;
use uuid::Uuid;

use crate::analytics;
use crate::callback::MAX_CALLBACK_BODY_BYTES;
use crate::client_ip::SourceIp;
use crate::error::PaymentError;
use crate::service::AppState;
use crate::store::PaymentStore;
use crate::types::{
    ActivateSubscriptionRequest, ActivateSubscriptionResponse, CallbackAck,
    InitiatePaymentRequest, InitiatePaymentResponse, PaymentHistoryQuery, PaymentStatusResponse,
};

const DEFAULT_HISTORY_PAGE_SIZE: u32 = 20;

// ---------------------------------------------------------------------------
// POST /payment/initiate
// ---------------------------------------------------------------------------

/// Pushes an M-Pesa payment prompt to the subscriber's phone.
pub async fn initiate_payment<S: PaymentStore, G: StkPushGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    Json(body): Json<InitiatePaymentRequest>,
) -> Result<Json<InitiatePaymentResponse>, PaymentError> {
    let initiated = state.initiator.initiate(&body).await?;

    Ok(Json(InitiatePaymentResponse {
        success: true,
        checkout_request_id: initiated.checkout_request_id,
        merchant_request_id: initiated.merchant_request_id,
        payment_id: initiated.payment_id,
        customer_message: initiated.customer_message,
    }))
}

// ---------------------------------------------------------------------------
// POST /mpesa-callback
// ---------------------------------------------------------------------------

/// Daraja result callback. Always acknowledged so the provider stops retrying;
/// failures, oversized bodies included, land in the error log.
pub async fn mpesa_callback<S: PaymentStore, G: StkPushGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    SourceIp(source_ip): SourceIp,
    body: Body,
) -> Json<CallbackAck> {
    let disposition = match axum::body::to_bytes(body, MAX_CALLBACK_BODY_BYTES).await {
        Ok(bytes) => state.receiver.receive(&bytes, source_ip).await,
        Err(e) => state.receiver.reject_unreadable(e.to_string(), source_ip).await,
    };
    info!(?disposition, ?source_ip, "M-Pesa callback acknowledged");
    Json(CallbackAck::ok())
}

// ---------------------------------------------------------------------------
// GET /payment/{id}/status
// ---------------------------------------------------------------------------

pub async fn payment_status<S: PaymentStore, G: StkPushGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>, PaymentError> {
    let payment = state.store.find_payment(payment_id).await?;

    analytics::track_payment_status_checked(payment.status.as_str());

    Ok(Json(PaymentStatusResponse {
        payment_id: payment.id,
        status: payment.status,
        mpesa_receipt_number: payment.mpesa_receipt_number,
        paid_at: payment.paid_at,
    }))
}

// ---------------------------------------------------------------------------
// GET /payment/history?user_id=...&offset=0&limit=20
// ---------------------------------------------------------------------------

/// A user's payments, newest first unless `order=asc`.
pub async fn payment_history<S: PaymentStore, G: StkPushGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    Query(params): Query<PaymentHistoryQuery>,
) -> Result<Json<Vec<Payment>>, PaymentError> {
    let user_id = params.user_id.trim();
    if user_id.is_empty() {
        return Err(PaymentError::Validation("user_id is required".into()));
    }

    let pagination = PaginationParams::new(
        params.offset.unwrap_or(0),
        params.limit.unwrap_or(DEFAULT_HISTORY_PAGE_SIZE),
        params.order.unwrap_or_default(),
    );

    let payments = state.store.user_payments(user_id, pagination).await?;
    Ok(Json(payments))
}

// ---------------------------------------------------------------------------
// GET /plans
// ---------------------------------------------------------------------------

pub async fn list_plans<S: PaymentStore, G: StkPushGateway>(
    State(state): State<Arc<AppState<S, G>>>,
) -> Result<Json<Vec<Plan>>, PaymentError> {
    Ok(Json(state.store.active_plans().await?))
}

// ---------------------------------------------------------------------------
// POST /subscriptions/activate
// ---------------------------------------------------------------------------

/// Activates the plan bought by a settled payment. The payment must be a
/// successful payment by the same user for the same plan.
pub async fn activate_subscription<S: PaymentStore, G: StkPushGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    Json(body): Json<ActivateSubscriptionRequest>,
) -> Result<Json<ActivateSubscriptionResponse>, PaymentError> {
    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return Err(PaymentError::Validation("user_id is required".into()));
    }
    let Some(payment_id) = body.payment_id else {
        return Err(PaymentError::Validation("payment_id is required".into()));
    };

    let payment = state.store.find_payment(payment_id).await?;
    if payment.user_id != user_id
        || payment.plan_id != Some(body.plan_id)
        || payment.status != PaymentStatus::Success
    {
        return Err(PaymentError::Validation(format!(
            "payment {payment_id} is not a successful payment for this plan"
        )));
    }

    let activation = state
        .activator
        .activate(user_id, body.plan_id, Some(payment_id))
        .await?;

    analytics::track_subscription_activated(activation.created, false);

    Ok(Json(ActivateSubscriptionResponse {
        subscription_id: activation.subscription_id,
        start_date: activation.start_date,
        end_date: activation.end_date,
        created: activation.created,
    }))
}
