//! In-memory fakes for the storage and gateway seams.

use be_mpesa::{MpesaError, StkPushAccepted, StkPushGateway, StkPushRequest};
use be_remote_db::{
    DbError, DbResult, ExpiredSubscription, NewAuditLog, NewErrorLog, NewPayment, NewSubscription,
    PaginationParams, Payment, PaymentMethod, PaymentSettlement, PaymentStatus, Plan, SortOrder,
    Subscription, SubscriptionStatus,
};
use be_subscription::SubscriptionStore;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::store::PaymentStore;

pub const TEST_USER: &str = "user-42";

#[derive(Default)]
pub struct MemoryStore {
    plans: Mutex<Vec<Plan>>,
    payments: Mutex<Vec<Payment>>,
    subscriptions: Mutex<Vec<Subscription>>,
    audits: Mutex<Vec<NewAuditLog>>,
    errors: Mutex<Vec<NewErrorLog>>,
    /// Snapshots served by the next checkout lookup, simulating a read that
    /// raced with another settlement.
    stale_lookups: Mutex<Vec<Payment>>,
}

impl MemoryStore {
    pub fn add_plan(&self, price: i64, validity_days: i32) -> Plan {
        let plan = Plan {
            id: Uuid::now_v7(),
            name: format!("{validity_days}-day plan"),
            price,
            speed_limit: Some("10Mbps".into()),
            validity_days,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.plans.lock().push(plan.clone());
        plan
    }

    pub fn retire_plan(&self, plan_id: Uuid) {
        if let Some(plan) = self.plans.lock().iter_mut().find(|p| p.id == plan_id) {
            plan.is_active = false;
        }
    }

    pub fn add_pending_payment(
        &self,
        plan_id: Option<Uuid>,
        amount: i64,
        checkout_request_id: &str,
    ) -> Payment {
        let payment = new_pending(NewPayment {
            user_id: TEST_USER.into(),
            plan_id,
            amount,
            method: PaymentMethod::Mpesa,
            phone_number: "254712345678".into(),
            checkout_request_id: checkout_request_id.into(),
            merchant_request_id: "29115-34620561-1".into(),
            account_reference: "ISP".into(),
        });
        self.payments.lock().push(payment.clone());
        payment
    }

    pub fn backdate(&self, payment_id: Uuid, by: TimeDelta) {
        if let Some(p) = self.payments.lock().iter_mut().find(|p| p.id == payment_id) {
            p.created_at -= by;
            p.updated_at -= by;
        }
    }

    /// Settles the payment as successful while the next lookup still sees it pending.
    pub fn settle_behind_lookup(&self, payment_id: Uuid) {
        let mut payments = self.payments.lock();
        let Some(p) = payments.iter_mut().find(|p| p.id == payment_id) else {
            return;
        };
        self.stale_lookups.lock().push(p.clone());
        p.status = PaymentStatus::Success;
        p.result_code = Some(0);
        p.paid_at = Some(Utc::now());
    }

    /// Marks the payment successful without going through the callback path.
    pub fn mark_paid(&self, payment_id: Uuid, receipt: &str) {
        if let Some(p) = self.payments.lock().iter_mut().find(|p| p.id == payment_id) {
            p.status = PaymentStatus::Success;
            p.mpesa_receipt_number = Some(receipt.into());
            p.result_code = Some(0);
            p.paid_at = Some(Utc::now());
        }
    }

    pub fn payment(&self, payment_id: Uuid) -> Option<Payment> {
        self.payments
            .lock()
            .iter()
            .find(|p| p.id == payment_id)
            .cloned()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.payments.lock().clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().clone()
    }

    pub fn audit_actions(&self) -> Vec<String> {
        self.audits.lock().iter().map(|a| a.action.clone()).collect()
    }

    pub fn error_logs(&self) -> Vec<NewErrorLog> {
        self.errors.lock().clone()
    }
}

fn new_pending(new: NewPayment) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::now_v7(),
        user_id: new.user_id,
        plan_id: new.plan_id,
        amount: new.amount,
        method: new.method,
        status: PaymentStatus::Pending,
        checkout_request_id: Some(new.checkout_request_id),
        merchant_request_id: Some(new.merchant_request_id),
        mpesa_receipt_number: None,
        phone_number: Some(new.phone_number),
        account_reference: Some(new.account_reference),
        result_code: None,
        result_description: None,
        created_at: now,
        updated_at: now,
        paid_at: None,
    }
}

impl SubscriptionStore for MemoryStore {
    async fn find_plan(&self, plan_id: Uuid) -> DbResult<Plan> {
        self.plans
            .lock()
            .iter()
            .find(|p| p.id == plan_id)
            .cloned()
            .ok_or_else(|| DbError::not_found_with_id("plan", plan_id.to_string()))
    }

    async fn find_subscription_for_payment(
        &self,
        payment_id: Uuid,
    ) -> DbResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .iter()
            .find(|s| s.payment_id == Some(payment_id))
            .cloned())
    }

    async fn insert_subscription(&self, new: NewSubscription) -> DbResult<Subscription> {
        let mut subscriptions = self.subscriptions.lock();
        if new.payment_id.is_some() && subscriptions.iter().any(|s| s.payment_id == new.payment_id)
        {
            return Err(DbError::duplicate(
                "constraint",
                "subscriptions_payment_id_key",
            ));
        }
        let subscription = Subscription {
            id: Uuid::now_v7(),
            user_id: new.user_id,
            plan_id: new.plan_id,
            payment_id: new.payment_id,
            start_date: new.start_date,
            end_date: new.end_date,
            status: SubscriptionStatus::Active,
            auto_renew: new.auto_renew,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn expire_active_before(&self, today: NaiveDate) -> DbResult<Vec<ExpiredSubscription>> {
        let plans = self.plans.lock();
        let mut expired = Vec::new();
        for s in self.subscriptions.lock().iter_mut() {
            if s.status == SubscriptionStatus::Active && s.end_date < today {
                s.status = SubscriptionStatus::Expired;
                expired.push(ExpiredSubscription {
                    id: s.id,
                    user_id: s.user_id.clone(),
                    plan_id: s.plan_id,
                    plan_name: plans
                        .iter()
                        .find(|p| p.id == s.plan_id)
                        .map(|p| p.name.clone())
                        .unwrap_or_default(),
                    end_date: s.end_date,
                });
            }
        }
        Ok(expired)
    }

    async fn paid_payments_without_subscription(&self, limit: i64) -> DbResult<Vec<Payment>> {
        let subscriptions = self.subscriptions.lock();
        Ok(self
            .payments
            .lock()
            .iter()
            .filter(|p| p.status == PaymentStatus::Success && p.plan_id.is_some())
            .filter(|p| !subscriptions.iter().any(|s| s.payment_id == Some(p.id)))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn record_audit(&self, entry: NewAuditLog) -> DbResult<()> {
        self.audits.lock().push(entry);
        Ok(())
    }
}

impl PaymentStore for MemoryStore {
    async fn insert_pending_payment(&self, payment: NewPayment) -> DbResult<Payment> {
        let mut payments = self.payments.lock();
        if payments
            .iter()
            .any(|p| p.checkout_request_id.as_deref() == Some(payment.checkout_request_id.as_str()))
        {
            return Err(DbError::duplicate(
                "checkout_request_id",
                payment.checkout_request_id,
            ));
        }
        let payment = new_pending(payment);
        payments.push(payment.clone());
        Ok(payment)
    }

    async fn find_payment(&self, id: Uuid) -> DbResult<Payment> {
        self.payment(id)
            .ok_or_else(|| DbError::not_found_with_id("payment", id.to_string()))
    }

    async fn find_payment_by_checkout(&self, checkout_request_id: &str) -> DbResult<Option<Payment>> {
        let mut stale = self.stale_lookups.lock();
        if let Some(pos) = stale
            .iter()
            .position(|p| p.checkout_request_id.as_deref() == Some(checkout_request_id))
        {
            return Ok(Some(stale.remove(pos)));
        }
        drop(stale);

        Ok(self
            .payments
            .lock()
            .iter()
            .find(|p| p.checkout_request_id.as_deref() == Some(checkout_request_id))
            .cloned())
    }

    async fn settle_if_pending(&self, settlement: PaymentSettlement) -> DbResult<Option<Payment>> {
        let mut payments = self.payments.lock();
        let Some(payment) = payments.iter_mut().find(|p| {
            p.checkout_request_id.as_deref() == Some(settlement.checkout_request_id.as_str())
                && p.status == PaymentStatus::Pending
        }) else {
            return Ok(None);
        };

        payment.status = settlement.status;
        payment.mpesa_receipt_number = settlement.mpesa_receipt_number;
        payment.result_code = Some(settlement.result_code);
        payment.result_description = Some(settlement.result_description);
        payment.paid_at = settlement.paid_at;
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn user_payments(
        &self,
        user_id: &str,
        params: PaginationParams,
    ) -> DbResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .lock()
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        if *params.order() == SortOrder::Desc {
            payments.reverse();
        }
        Ok(payments
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect())
    }

    async fn active_plans(&self) -> DbResult<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .plans
            .lock()
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.price);
        Ok(plans)
    }

    async fn fail_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> DbResult<Vec<Payment>> {
        let mut failed = Vec::new();
        for p in self.payments.lock().iter_mut() {
            if p.status == PaymentStatus::Pending && p.created_at < cutoff {
                p.status = PaymentStatus::Failed;
                p.result_description = Some(reason.to_string());
                p.updated_at = Utc::now();
                failed.push(p.clone());
            }
        }
        Ok(failed)
    }

    async fn record_error(&self, entry: NewErrorLog) -> DbResult<()> {
        self.errors.lock().push(entry);
        Ok(())
    }
}

/// Records every push; answers with fresh ids or with a one-shot failure.
#[derive(Default)]
pub struct FakeGateway {
    sent: Mutex<Vec<StkPushRequest>>,
    failure: Mutex<Option<MpesaError>>,
}

impl FakeGateway {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn failing(error: MpesaError) -> Self {
        Self {
            sent: Mutex::default(),
            failure: Mutex::new(Some(error)),
        }
    }

    pub fn sent(&self) -> Vec<StkPushRequest> {
        self.sent.lock().clone()
    }
}

impl StkPushGateway for FakeGateway {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAccepted, MpesaError> {
        if let Some(error) = self.failure.lock().take() {
            return Err(error);
        }
        self.sent.lock().push(request.clone());
        let id = Uuid::now_v7().simple();
        Ok(StkPushAccepted {
            merchant_request_id: format!("29115-{id}"),
            checkout_request_id: format!("ws_CO_{id}"),
            customer_message: Some("Success. Request accepted for processing".into()),
        })
    }
}

/// A Daraja STK callback body; `receipt` adds success metadata.
pub fn callback_body(checkout_request_id: &str, result_code: i64, receipt: Option<&str>) -> Vec<u8> {
    let description = if result_code == 0 {
        "The service request is processed successfully."
    } else {
        "Request cancelled by user"
    };
    let mut callback = serde_json::json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": checkout_request_id,
        "ResultCode": result_code,
        "ResultDesc": description,
    });

    if let Some(receipt) = receipt {
        callback["CallbackMetadata"] = serde_json::json!({
            "Item": [
                { "Name": "Amount", "Value": 1000 },
                { "Name": "MpesaReceiptNumber", "Value": receipt },
                { "Name": "Balance" },
                { "Name": "TransactionDate", "Value": 20191219102115_i64 },
                { "Name": "PhoneNumber", "Value": 254712345678_i64 }
            ]
        });
    }

    serde_json::json!({ "Body": { "stkCallback": callback } })
        .to_string()
        .into_bytes()
}
