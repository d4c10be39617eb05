use std::future::Future;

use be_remote_db::{
    DatabaseManager, DbResult, NewErrorLog, NewPayment, PaginationParams, Payment,
    PaymentSettlement, Plan,
};
use be_subscription::SubscriptionStore;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence used by the payment flow, on top of what subscription activation needs.
pub trait PaymentStore: SubscriptionStore {
    fn insert_pending_payment(
        &self,
        payment: NewPayment,
    ) -> impl Future<Output = DbResult<Payment>> + Send;

    fn find_payment(&self, id: Uuid) -> impl Future<Output = DbResult<Payment>> + Send;

    fn find_payment_by_checkout(
        &self,
        checkout_request_id: &str,
    ) -> impl Future<Output = DbResult<Option<Payment>>> + Send;

    /// Returns `None` when the payment is no longer `pending` (or does not exist).
    fn settle_if_pending(
        &self,
        settlement: PaymentSettlement,
    ) -> impl Future<Output = DbResult<Option<Payment>>> + Send;

    fn user_payments(
        &self,
        user_id: &str,
        params: PaginationParams,
    ) -> impl Future<Output = DbResult<Vec<Payment>>> + Send;

    fn active_plans(&self) -> impl Future<Output = DbResult<Vec<Plan>>> + Send;

    fn fail_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> impl Future<Output = DbResult<Vec<Payment>>> + Send;

    fn record_error(&self, entry: NewErrorLog) -> impl Future<Output = DbResult<()>> + Send;
}

impl PaymentStore for DatabaseManager {
    async fn insert_pending_payment(&self, payment: NewPayment) -> DbResult<Payment> {
        self.create_payment().new_payment(payment).call().await
    }

    async fn find_payment(&self, id: Uuid) -> DbResult<Payment> {
        self.get_payment().id(id).call().await
    }

    async fn find_payment_by_checkout(&self, checkout_request_id: &str) -> DbResult<Option<Payment>> {
        self.get_payment_by_checkout_request_id()
            .checkout_request_id(checkout_request_id)
            .call()
            .await
    }

    async fn settle_if_pending(&self, settlement: PaymentSettlement) -> DbResult<Option<Payment>> {
        self.settle_pending_payment()
            .settlement(settlement)
            .call()
            .await
    }

    async fn user_payments(
        &self,
        user_id: &str,
        params: PaginationParams,
    ) -> DbResult<Vec<Payment>> {
        self.list_payments_for_user()
            .user_id(user_id)
            .params(params)
            .call()
            .await
    }

    async fn active_plans(&self) -> DbResult<Vec<Plan>> {
        self.list_active_plans().await
    }

    async fn fail_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> DbResult<Vec<Payment>> {
        self.fail_stale_pending_payments()
            .created_before(cutoff)
            .reason(reason)
            .call()
            .await
    }

    async fn record_error(&self, entry: NewErrorLog) -> DbResult<()> {
        self.create_error_log().entry(entry).call().await
    }
}
