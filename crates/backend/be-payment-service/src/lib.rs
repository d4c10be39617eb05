use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use be_mpesa::{CALLBACK_PATH, StkPushGateway};
use be_remote_db::DatabaseManager;
use tower::ServiceBuilder;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::debug;

mod analytics;
pub mod callback;
pub mod client_ip;
pub mod config;
pub mod error;
pub mod handlers;
pub mod initiator;
pub mod reaper;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

use service::AppState;

pub fn create_router<S: PaymentStore, G: StkPushGateway>(state: Arc<AppState<S, G>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.config.allowed_origins.clone()))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let initiate_governor = GovernorConfigBuilder::default()
        .per_second(6)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("valid governor config");

    let initiate_route = Router::new()
        .route("/payment/initiate", post(handlers::initiate_payment::<S, G>))
        .layer(GovernorLayer::new(Arc::new(initiate_governor)));

    let payment_routes = Router::new()
        .route("/payment/{id}/status", get(handlers::payment_status::<S, G>))
        .route("/payment/history", get(handlers::payment_history::<S, G>))
        .route("/plans", get(handlers::list_plans::<S, G>))
        .route(
            "/subscriptions/activate",
            post(handlers::activate_subscription::<S, G>),
        );

    let callback_route = Router::new().route(CALLBACK_PATH, post(handlers::mpesa_callback::<S, G>));

    // The callback reads its own body up to `MAX_CALLBACK_BODY_BYTES` so that
    // oversized deliveries are still acknowledged.
    initiate_route
        .merge(payment_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .merge(callback_route)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Builds the payment router from the environment. The returned state is
/// shared with the scheduled jobs.
pub fn init_payment_service(db: Arc<DatabaseManager>) -> Result<(Router, Arc<AppState>)> {
    debug!("Initializing payment service");

    let state = Arc::new(AppState::from_env(db).context("Failed to create payment service state")?);

    Ok((create_router(state.clone()), state))
}

pub use callback::{
    CallbackDisposition, CallbackReceiver, MAX_CALLBACK_BODY_BYTES, ReconciliationError,
};
pub use config::PaymentConfig;
pub use error::PaymentError;
pub use initiator::{InitiatedPayment, PaymentInitiator};
pub use reaper::{STALE_PAYMENT_REASON, StalePaymentReaper};
pub use store::PaymentStore;
pub use types::{
    ActivateSubscriptionRequest, ActivateSubscriptionResponse, CallbackAck,
    InitiatePaymentRequest, InitiatePaymentResponse, PaymentHistoryQuery, PaymentStatusResponse,
};
