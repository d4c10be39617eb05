use std::net::IpAddr;
use std::sync::Arc;

use be_mpesa::{CallbackEnvelope, StkCallback};
use be_remote_db::{DbError, NewAuditLog, NewErrorLog, Payment, PaymentSettlement, PaymentStatus};
use be_subscription::{SubscriptionActivator, SubscriptionError};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analytics;
use crate::store::PaymentStore;

/// `source` recorded on every error-log row written by the receiver.
pub const ERROR_LOG_SOURCE: &str = "mpesa-callback";

/// Largest callback body read before the delivery is rejected. Daraja results
/// are a few hundred bytes.
pub const MAX_CALLBACK_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("Unparseable callback body: {0}")]
    Parse(String),

    #[error("Unreadable callback body: {0}")]
    Unreadable(String),

    #[error("No payment matches CheckoutRequestID {0}")]
    UnknownCheckout(String),

    #[error("Storage failure while reconciling: {0}")]
    Storage(#[from] DbError),

    #[error("Subscription activation failed for payment {payment_id}: {source}")]
    Activation {
        payment_id: Uuid,
        #[source]
        source: SubscriptionError,
    },
}

impl ReconciliationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReconciliationError::Parse(_) | ReconciliationError::Unreadable(_) => "parse",
            ReconciliationError::UnknownCheckout(_) => "reconciliation",
            ReconciliationError::Storage(_) => "storage",
            ReconciliationError::Activation { .. } => "activation",
        }
    }
}

/// What the receiver did with one delivery. The HTTP response is the same for all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackDisposition {
    Settled {
        payment_id: Uuid,
        status: PaymentStatus,
    },
    AlreadyReconciled {
        payment_id: Uuid,
    },
    UnknownCheckout,
    Rejected,
    Failed,
}

/// Applies Daraja's asynchronous STK results to pending payments.
pub struct CallbackReceiver<S> {
    store: Arc<S>,
    activator: SubscriptionActivator<S>,
}

impl<S> Clone for CallbackReceiver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            activator: self.activator.clone(),
        }
    }
}

impl<S: PaymentStore> CallbackReceiver<S> {
    pub fn new(store: Arc<S>, activator: SubscriptionActivator<S>) -> Self {
        Self { store, activator }
    }

    /// Never fails: every problem ends up in the error log instead.
    pub async fn receive(&self, body: &[u8], source_ip: Option<IpAddr>) -> CallbackDisposition {
        let callback = match CallbackEnvelope::from_slice(body) {
            Ok(envelope) => envelope.into_callback(),
            Err(e) => {
                self.record_failure(ReconciliationError::Parse(e.to_string()), body, source_ip)
                    .await;
                analytics::track_callback_rejected("parse");
                return CallbackDisposition::Rejected;
            }
        };

        let Ok(result_code) = i32::try_from(callback.result_code) else {
            let err = ReconciliationError::Parse(format!(
                "ResultCode {} is out of range",
                callback.result_code
            ));
            self.record_failure(err, body, source_ip).await;
            return CallbackDisposition::Rejected;
        };

        let payment = match self
            .store
            .find_payment_by_checkout(&callback.checkout_request_id)
            .await
        {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                let err =
                    ReconciliationError::UnknownCheckout(callback.checkout_request_id.clone());
                self.record_failure(err, body, source_ip).await;
                analytics::track_callback_rejected("unknown_checkout");
                return CallbackDisposition::UnknownCheckout;
            }
            Err(e) => {
                self.record_failure(e.into(), body, source_ip).await;
                return CallbackDisposition::Failed;
            }
        };

        if payment.status.is_terminal() {
            info!(
                payment_id = %payment.id,
                status = %payment.status,
                checkout_request_id = %callback.checkout_request_id,
                "Callback for already reconciled payment ignored"
            );
            return CallbackDisposition::AlreadyReconciled {
                payment_id: payment.id,
            };
        }

        let settlement = settlement_for(&callback, result_code);
        let status = settlement.status;

        let settled = match self.store.settle_if_pending(settlement).await {
            Ok(Some(settled)) => settled,
            Ok(None) => {
                // Another delivery (or the stale reaper) won the conditional update.
                info!(
                    payment_id = %payment.id,
                    checkout_request_id = %callback.checkout_request_id,
                    "Payment was reconciled concurrently"
                );
                return CallbackDisposition::AlreadyReconciled {
                    payment_id: payment.id,
                };
            }
            Err(e) => {
                self.record_failure(e.into(), body, source_ip).await;
                return CallbackDisposition::Failed;
            }
        };

        let confirmed_amount = callback.confirmed_amount();
        if status == PaymentStatus::Success
            && let Some(amount) = confirmed_amount
            && amount != settled.amount
        {
            warn!(
                payment_id = %settled.id,
                expected = settled.amount,
                confirmed = amount,
                "Confirmed amount differs from requested amount"
            );
        }

        info!(
            payment_id = %settled.id,
            %status,
            result_code,
            receipt = ?settled.mpesa_receipt_number,
            ?source_ip,
            "Payment reconciled"
        );

        self.audit(NewAuditLog::new(
            settled.user_id.as_str(),
            "payment.reconciled",
            serde_json::json!({
                "payment_id": settled.id,
                "checkout_request_id": callback.checkout_request_id,
                "result_code": result_code,
                "result_description": callback.result_desc,
                "status": status,
                "amount": confirmed_amount,
                "phone": callback.confirmed_phone(),
                "transaction_date": callback.transaction_date(),
                "mpesa_receipt_number": settled.mpesa_receipt_number,
            }),
        ))
        .await;

        analytics::track_payment_reconciled(status.as_str(), callback.result_code);

        if status == PaymentStatus::Success {
            self.activate_plan(&settled, body, source_ip).await;
        }

        CallbackDisposition::Settled {
            payment_id: settled.id,
            status,
        }
    }

    /// Logs a delivery whose body could not be read, e.g. one over
    /// [`MAX_CALLBACK_BODY_BYTES`].
    pub async fn reject_unreadable(
        &self,
        reason: impl Into<String>,
        source_ip: Option<IpAddr>,
    ) -> CallbackDisposition {
        let err = ReconciliationError::Unreadable(reason.into());
        self.write_error_log(err, None, source_ip).await;
        analytics::track_callback_rejected("unreadable");
        CallbackDisposition::Rejected
    }

    async fn activate_plan(&self, payment: &Payment, body: &[u8], source_ip: Option<IpAddr>) {
        let Some(plan_id) = payment.plan_id else {
            return;
        };

        match self
            .activator
            .activate(&payment.user_id, plan_id, Some(payment.id))
            .await
        {
            Ok(activation) => {
                analytics::track_subscription_activated(activation.created, true);
            }
            Err(source) => {
                let err = ReconciliationError::Activation {
                    payment_id: payment.id,
                    source,
                };
                self.record_failure(err, body, source_ip).await;
            }
        }
    }

    async fn audit(&self, entry: NewAuditLog) {
        let action = entry.action.clone();
        if let Err(e) = self.store.record_audit(entry).await {
            warn!(%action, error = %e, "Failed to write audit log");
        }
    }

    async fn record_failure(
        &self,
        err: ReconciliationError,
        body: &[u8],
        source_ip: Option<IpAddr>,
    ) {
        self.write_error_log(err, Some(payload_of(body)), source_ip).await;
    }

    async fn write_error_log(
        &self,
        err: ReconciliationError,
        payload: Option<serde_json::Value>,
        source_ip: Option<IpAddr>,
    ) {
        warn!(kind = err.kind(), error = %err, ?source_ip, "M-Pesa callback not applied");

        let entry = NewErrorLog {
            source: ERROR_LOG_SOURCE.to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
            payload,
            source_ip: source_ip.map(|ip| ip.to_string()),
        };

        if let Err(e) = self.store.record_error(entry).await {
            error!(kind = err.kind(), error = %e, "Failed to write error log");
        }
    }
}

fn settlement_for(callback: &StkCallback, result_code: i32) -> PaymentSettlement {
    let success = callback.is_success();
    PaymentSettlement {
        checkout_request_id: callback.checkout_request_id.clone(),
        status: if success {
            PaymentStatus::Success
        } else {
            PaymentStatus::Failed
        },
        mpesa_receipt_number: if success {
            callback.receipt_number()
        } else {
            None
        },
        result_code,
        result_description: callback.result_desc.clone(),
        paid_at: success.then(Utc::now),
    }
}

/// The body as JSON when it parses, otherwise as a (lossy) string.
fn payload_of(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(body).into_owned())
    })
}
