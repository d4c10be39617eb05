use std::future::Future;

use be_remote_db::{
    DatabaseManager, DbResult, ExpiredSubscription, NewAuditLog, NewSubscription, Payment, Plan,
    Subscription,
};
use chrono::NaiveDate;
use uuid::Uuid;

/// Storage the activator needs. [`DatabaseManager`] is the production implementation.
pub trait SubscriptionStore: Send + Sync + 'static {
    fn find_plan(&self, plan_id: Uuid) -> impl Future<Output = DbResult<Plan>> + Send;

    fn find_subscription_for_payment(
        &self,
        payment_id: Uuid,
    ) -> impl Future<Output = DbResult<Option<Subscription>>> + Send;

    fn insert_subscription(
        &self,
        subscription: NewSubscription,
    ) -> impl Future<Output = DbResult<Subscription>> + Send;

    fn expire_active_before(
        &self,
        today: NaiveDate,
    ) -> impl Future<Output = DbResult<Vec<ExpiredSubscription>>> + Send;

    fn paid_payments_without_subscription(
        &self,
        limit: i64,
    ) -> impl Future<Output = DbResult<Vec<Payment>>> + Send;

    fn record_audit(&self, entry: NewAuditLog) -> impl Future<Output = DbResult<()>> + Send;
}

impl SubscriptionStore for DatabaseManager {
    async fn find_plan(&self, plan_id: Uuid) -> DbResult<Plan> {
        self.get_plan().id(plan_id).call().await
    }

    async fn find_subscription_for_payment(
        &self,
        payment_id: Uuid,
    ) -> DbResult<Option<Subscription>> {
        self.get_subscription_by_payment()
            .payment_id(payment_id)
            .call()
            .await
    }

    async fn insert_subscription(&self, subscription: NewSubscription) -> DbResult<Subscription> {
        self.create_subscription()
            .new_subscription(subscription)
            .call()
            .await
    }

    async fn expire_active_before(&self, today: NaiveDate) -> DbResult<Vec<ExpiredSubscription>> {
        self.expire_due_subscriptions().today(today).call().await
    }

    async fn paid_payments_without_subscription(&self, limit: i64) -> DbResult<Vec<Payment>> {
        self.list_paid_payments_without_subscription()
            .limit(limit)
            .call()
            .await
    }

    async fn record_audit(&self, entry: NewAuditLog) -> DbResult<()> {
        self.create_audit_log().entry(entry).call().await
    }
}
