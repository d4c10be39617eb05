use std::sync::Arc;

use be_mpesa::{StkPushAccepted, StkPushGateway, StkPushRequest};
use be_remote_db::{NewAuditLog, NewPayment, PaymentMethod};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analytics;
use crate::error::PaymentError;
use crate::store::PaymentStore;
use crate::types::InitiatePaymentRequest;

const DEFAULT_ACCOUNT_REFERENCE: &str = "ISP";
const PLAN_REFERENCE_PREFIX: &str = "PLAN_";
const PLAN_REFERENCE_ID_CHARS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitiatedPayment {
    pub payment_id: Uuid,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub customer_message: Option<String>,
}

/// `PLAN_` followed by the leading characters of the plan id.
pub fn plan_account_reference(plan_id: Uuid) -> String {
    let simple = plan_id.simple().to_string();
    format!(
        "{PLAN_REFERENCE_PREFIX}{}",
        &simple[..PLAN_REFERENCE_ID_CHARS]
    )
}

/// Sends STK push prompts and records the resulting `pending` payments.
pub struct PaymentInitiator<S, G> {
    store: Arc<S>,
    gateway: Arc<G>,
    description: String,
}

impl<S, G> Clone for PaymentInitiator<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            gateway: self.gateway.clone(),
            description: self.description.clone(),
        }
    }
}

impl<S: PaymentStore, G: StkPushGateway> PaymentInitiator<S, G> {
    pub fn new(store: Arc<S>, gateway: Arc<G>, description: impl Into<String>) -> Self {
        Self {
            store,
            gateway,
            description: description.into(),
        }
    }

    pub async fn initiate(
        &self,
        request: &InitiatePaymentRequest,
    ) -> Result<InitiatedPayment, PaymentError> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(PaymentError::Validation("user_id is required".into()));
        }

        let amount = self.resolve_amount(request).await?;

        let account_reference = request
            .account_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match request.plan_id {
                Some(plan_id) => plan_account_reference(plan_id),
                None => DEFAULT_ACCOUNT_REFERENCE.to_string(),
            });

        let push = StkPushRequest::new(
            amount,
            request.phone.as_str(),
            account_reference,
            self.description.as_str(),
        )?;

        let has_plan = request.plan_id.is_some();
        let accepted: StkPushAccepted = match self.gateway.stk_push(&push).await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(%user_id, error = %e, "STK push was not accepted");
                analytics::track_stk_push_failed(has_plan, e.kind());
                return Err(e.into());
            }
        };

        let new_payment = NewPayment {
            user_id: user_id.to_string(),
            plan_id: request.plan_id,
            amount,
            method: PaymentMethod::Mpesa,
            phone_number: push.phone_number.clone(),
            checkout_request_id: accepted.checkout_request_id.clone(),
            merchant_request_id: accepted.merchant_request_id.clone(),
            account_reference: push.account_reference.clone(),
        };

        let payment = match self.store.insert_pending_payment(new_payment).await {
            Ok(payment) => payment,
            Err(e) => {
                // The prompt is already on the handset; its callback will be unknown.
                error!(
                    checkout_request_id = %accepted.checkout_request_id,
                    merchant_request_id = %accepted.merchant_request_id,
                    error = %e,
                    "Failed to persist pending payment after STK push"
                );
                return Err(e.into());
            }
        };

        info!(
            payment_id = %payment.id,
            %user_id,
            amount,
            checkout_request_id = %accepted.checkout_request_id,
            "STK push sent"
        );

        let audit = NewAuditLog::new(
            user_id,
            "payment.initiated",
            serde_json::json!({
                "payment_id": payment.id,
                "amount": amount,
                "phone": push.phone_number,
                "plan_id": request.plan_id,
                "email": request.email,
                "checkout_request_id": accepted.checkout_request_id,
                "merchant_request_id": accepted.merchant_request_id,
            }),
        );
        if let Err(e) = self.store.record_audit(audit).await {
            warn!(payment_id = %payment.id, error = %e, "Failed to write audit log");
        }

        analytics::track_stk_push_sent(amount, has_plan);

        Ok(InitiatedPayment {
            payment_id: payment.id,
            checkout_request_id: accepted.checkout_request_id,
            merchant_request_id: accepted.merchant_request_id,
            customer_message: accepted.customer_message,
        })
    }

    async fn resolve_amount(&self, request: &InitiatePaymentRequest) -> Result<i64, PaymentError> {
        let Some(plan_id) = request.plan_id else {
            return request.amount.ok_or_else(|| {
                PaymentError::Validation("either amount or plan_id is required".into())
            });
        };

        let plan = match self.store.find_plan(plan_id).await {
            Ok(plan) => plan,
            Err(e) if e.is_not_found() => {
                return Err(PaymentError::NotFound(format!("Plan {plan_id} not found")));
            }
            Err(e) => return Err(e.into()),
        };

        if !plan.is_active {
            return Err(PaymentError::NotFound(format!(
                "Plan {plan_id} is not available"
            )));
        }

        if let Some(amount) = request.amount
            && amount != plan.price
        {
            return Err(PaymentError::Validation(format!(
                "amount {amount} does not match the price of plan '{}' ({})",
                plan.name, plan.price
            )));
        }

        Ok(plan.price)
    }
}
