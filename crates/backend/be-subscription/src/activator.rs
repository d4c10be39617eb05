use std::sync::Arc;

use be_remote_db::{NewAuditLog, NewSubscription, Subscription};
use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::SubscriptionError;
use crate::store::SubscriptionStore;

/// How many unlinked payments one reconciliation pass picks up.
const UNLINKED_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activation {
    pub subscription_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// `false` when an existing subscription for the same payment was returned.
    pub created: bool,
}

impl Activation {
    fn from_subscription(subscription: &Subscription, created: bool) -> Self {
        Self {
            subscription_id: subscription.id,
            plan_id: subscription.plan_id,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            created,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    pub expired_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub activated_count: usize,
    pub failed_count: usize,
}

/// Last day of access for a subscription starting on `start_date`.
pub fn subscription_end_date(start_date: NaiveDate, validity_days: i32) -> Option<NaiveDate> {
    let days = u64::try_from(validity_days).ok().filter(|d| *d > 0)?;
    start_date.checked_add_days(Days::new(days))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Creates subscriptions for paid plans and expires them once their window closes.
pub struct SubscriptionActivator<S> {
    store: Arc<S>,
}

impl<S> Clone for SubscriptionActivator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: SubscriptionStore> SubscriptionActivator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn activate(
        &self,
        user_id: &str,
        plan_id: Uuid,
        payment_id: Option<Uuid>,
    ) -> Result<Activation, SubscriptionError> {
        self.activate_on(user_id, plan_id, payment_id, today())
            .await
    }

    /// Activation keyed by `payment_id`: a payment yields at most one subscription.
    pub async fn activate_on(
        &self,
        user_id: &str,
        plan_id: Uuid,
        payment_id: Option<Uuid>,
        start_date: NaiveDate,
    ) -> Result<Activation, SubscriptionError> {
        if let Some(payment_id) = payment_id
            && let Some(existing) = self.store.find_subscription_for_payment(payment_id).await?
        {
            info!(%payment_id, subscription_id = %existing.id, "Payment already has a subscription");
            return Ok(Activation::from_subscription(&existing, false));
        }

        let plan = match self.store.find_plan(plan_id).await {
            Ok(plan) => plan,
            Err(e) if e.is_not_found() => return Err(SubscriptionError::PlanNotFound(plan_id)),
            Err(e) => return Err(e.into()),
        };

        let end_date = subscription_end_date(start_date, plan.validity_days).ok_or(
            SubscriptionError::InvalidPlan {
                plan_id,
                validity_days: plan.validity_days,
            },
        )?;

        let new_subscription = NewSubscription {
            user_id: user_id.to_string(),
            plan_id,
            payment_id,
            start_date,
            end_date,
            auto_renew: false,
        };

        let subscription = match self.store.insert_subscription(new_subscription).await {
            Ok(subscription) => subscription,
            Err(e) if e.is_duplicate() => {
                // Lost a race with a concurrent activation for the same payment.
                let Some(payment_id) = payment_id else {
                    return Err(e.into());
                };
                return match self.store.find_subscription_for_payment(payment_id).await? {
                    Some(existing) => Ok(Activation::from_subscription(&existing, false)),
                    None => Err(e.into()),
                };
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            subscription_id = %subscription.id,
            %user_id,
            plan = %plan.name,
            %start_date,
            %end_date,
            "Subscription activated"
        );

        self.audit(NewAuditLog::new(
            user_id,
            "subscription.created",
            serde_json::json!({
                "subscription_id": subscription.id,
                "plan_id": plan.id,
                "plan_name": plan.name,
                "payment_id": payment_id,
                "start_date": start_date,
                "end_date": end_date,
            }),
        ))
        .await;

        Ok(Activation::from_subscription(&subscription, true))
    }

    pub async fn expire_due(&self) -> Result<ExpiryReport, SubscriptionError> {
        self.expire_due_on(today()).await
    }

    /// Moves active subscriptions whose end date is before `today` to `expired`,
    /// writing one audit entry per subscription.
    pub async fn expire_due_on(&self, today: NaiveDate) -> Result<ExpiryReport, SubscriptionError> {
        let expired = self.store.expire_active_before(today).await?;

        for subscription in &expired {
            self.audit(NewAuditLog::new(
                subscription.user_id.as_str(),
                "subscription.expired",
                serde_json::json!({
                    "subscription_id": subscription.id,
                    "plan_id": subscription.plan_id,
                    "plan_name": subscription.plan_name,
                    "end_date": subscription.end_date,
                }),
            ))
            .await;
        }

        if !expired.is_empty() {
            info!(expired_count = expired.len(), %today, "Expired subscriptions");
        }

        Ok(ExpiryReport {
            expired_count: expired.len(),
        })
    }

    /// Activates successful plan payments that have no subscription yet.
    pub async fn activate_unlinked_payments(&self) -> Result<ReconcileReport, SubscriptionError> {
        let payments = self
            .store
            .paid_payments_without_subscription(UNLINKED_BATCH_SIZE)
            .await?;

        let mut report = ReconcileReport::default();
        for payment in payments {
            let Some(plan_id) = payment.plan_id else {
                continue;
            };

            let start_date = payment
                .paid_at
                .map(|paid_at| paid_at.date_naive())
                .unwrap_or_else(today);

            match self
                .activate_on(&payment.user_id, plan_id, Some(payment.id), start_date)
                .await
            {
                Ok(activation) if activation.created => report.activated_count += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(payment_id = %payment.id, error = %e, "Failed to activate unlinked payment");
                    report.failed_count += 1;
                }
            }
        }

        if report.activated_count > 0 || report.failed_count > 0 {
            warn!(
                activated = report.activated_count,
                failed = report.failed_count,
                "Reconciled successful payments missing a subscription"
            );
        }

        Ok(report)
    }

    async fn audit(&self, entry: NewAuditLog) {
        let action = entry.action.clone();
        if let Err(e) = self.store.record_audit(entry).await {
            warn!(%action, error = %e, "Failed to write audit log");
        }
    }
}
