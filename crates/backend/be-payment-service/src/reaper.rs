use std::sync::Arc;

use be_remote_db::{DbError, NewAuditLog};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use crate::store::PaymentStore;

/// `result_description` written on payments failed by the reaper.
pub const STALE_PAYMENT_REASON: &str = "no callback received";

/// Fails payments whose callback never arrived.
///
/// Uses the same `pending` guard as the callback path, so a late callback and
/// the reaper cannot both settle a payment.
pub struct StalePaymentReaper<S> {
    store: Arc<S>,
    ttl: TimeDelta,
}

impl<S> Clone for StalePaymentReaper<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ttl: self.ttl,
        }
    }
}

impl<S: PaymentStore> StalePaymentReaper<S> {
    pub fn new(store: Arc<S>, ttl: TimeDelta) -> Self {
        Self { store, ttl }
    }

    pub async fn reap(&self) -> Result<usize, DbError> {
        self.reap_at(Utc::now()).await
    }

    pub async fn reap_at(&self, now: DateTime<Utc>) -> Result<usize, DbError> {
        let cutoff = now - self.ttl;
        let expired = self
            .store
            .fail_pending_created_before(cutoff, STALE_PAYMENT_REASON)
            .await?;

        for payment in &expired {
            let entry = NewAuditLog::new(
                payment.user_id.as_str(),
                "payment.expired",
                serde_json::json!({
                    "payment_id": payment.id,
                    "checkout_request_id": payment.checkout_request_id,
                    "amount": payment.amount,
                    "created_at": payment.created_at,
                }),
            );
            if let Err(e) = self.store.record_audit(entry).await {
                warn!(payment_id = %payment.id, error = %e, "Failed to write audit log");
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), %cutoff, "Failed stale pending payments");
        }

        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use be_remote_db::PaymentStatus;

    use super::*;
    use crate::test_support::MemoryStore;

    #[tokio::test]
    async fn only_payments_older_than_ttl_are_failed() {
        let store = Arc::new(MemoryStore::default());
        let old = store.add_pending_payment(None, 100, "ws_CO_old");
        let fresh = store.add_pending_payment(None, 100, "ws_CO_fresh");
        store.backdate(old.id, TimeDelta::hours(30));

        let reaper = StalePaymentReaper::new(store.clone(), TimeDelta::hours(24));
        assert_eq!(reaper.reap().await.unwrap(), 1);
        assert_eq!(reaper.reap().await.unwrap(), 0);

        let old = store.payment(old.id).unwrap();
        assert_eq!(old.status, PaymentStatus::Failed);
        assert_eq!(old.result_description.as_deref(), Some(STALE_PAYMENT_REASON));
        assert_eq!(
            store.payment(fresh.id).unwrap().status,
            PaymentStatus::Pending
        );
        assert_eq!(store.audit_actions(), vec!["payment.expired"]);
    }

    #[tokio::test]
    async fn settled_payments_are_left_alone() {
        let store = Arc::new(MemoryStore::default());
        let paid = store.add_pending_payment(None, 100, "ws_CO_paid");
        store.backdate(paid.id, TimeDelta::hours(48));
        store.settle_behind_lookup(paid.id);

        let reaper = StalePaymentReaper::new(store.clone(), TimeDelta::hours(24));
        assert_eq!(reaper.reap().await.unwrap(), 0);
        assert_eq!(
            store.payment(paid.id).unwrap().status,
            PaymentStatus::Success
        );
    }
}
