use bon::bon;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    migrate::MigrateDatabase,
    postgres::{PgPool, PgPoolOptions},
};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    error::{DbError, DbResult},
    types::{
        ExpiredSubscription, NewAuditLog, NewErrorLog, NewPayment, NewSubscription,
        PaginationParams, Payment, PaymentSettlement, Plan, Subscription,
    },
};

const PLAN_COLUMNS: &str =
    "id, name, price, speed_limit, validity_days, is_active, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, user_id, plan_id, amount, method, status, checkout_request_id, \
     merchant_request_id, mpesa_receipt_number, phone_number, account_reference, result_code, \
     result_description, created_at, updated_at, paid_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, payment_id, start_date, end_date, \
     status, auto_renew, created_at, updated_at";

#[derive(Debug)]
pub struct DatabaseManager {
    pub pool: PgPool,
}

#[bon]
impl DatabaseManager {
    pub async fn new(database_url: &str) -> DbResult<Self> {
        if !sqlx::Postgres::database_exists(database_url).await? {
            sqlx::Postgres::create_database(database_url).await?;
        }

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        let db_manager = DatabaseManager { pool };

        Self::run_migrations(&db_manager.pool).await?;

        Ok(db_manager)
    }

    async fn run_migrations(pool: &PgPool) -> DbResult<()> {
        let migrator = sqlx::migrate!("./src/migrations");
        migrator.run(pool).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plans
    // ------------------------------------------------------------------

    #[builder]
    pub async fn get_plan(&self, id: Uuid) -> DbResult<Plan> {
        let query = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1");

        sqlx::query_as::<_, Plan>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found_with_id("plan", id.to_string()))
    }

    pub async fn list_active_plans(&self) -> DbResult<Vec<Plan>> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE is_active = TRUE ORDER BY price ASC, name ASC"
        );

        let plans = sqlx::query_as::<_, Plan>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(plans)
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    #[builder]
    pub async fn create_payment(&self, new_payment: NewPayment) -> DbResult<Payment> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        let query = format!(
            r#"
            INSERT INTO payments (
                id, user_id, plan_id, amount, method, status, checkout_request_id,
                merchant_request_id, phone_number, account_reference, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $9, $10, $10)
            RETURNING {PAYMENT_COLUMNS}
            "#
        );

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(id)
            .bind(&new_payment.user_id)
            .bind(new_payment.plan_id)
            .bind(new_payment.amount)
            .bind(new_payment.method)
            .bind(&new_payment.checkout_request_id)
            .bind(&new_payment.merchant_request_id)
            .bind(&new_payment.phone_number)
            .bind(&new_payment.account_reference)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(payment)
    }

    #[builder]
    pub async fn get_payment(&self, id: Uuid) -> DbResult<Payment> {
        let query = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");

        sqlx::query_as::<_, Payment>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found_with_id("payment", id.to_string()))
    }

    #[builder]
    pub async fn get_payment_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> DbResult<Option<Payment>> {
        let query =
            format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE checkout_request_id = $1");

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(checkout_request_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    /// Applies a terminal result to a payment that is still `pending`.
    ///
    /// Returns `None` when no pending row matched, either because the checkout
    /// id is unknown or because the payment was already settled.
    #[builder]
    pub async fn settle_pending_payment(
        &self,
        settlement: PaymentSettlement,
    ) -> DbResult<Option<Payment>> {
        let now = Utc::now();

        let query = format!(
            r#"
            UPDATE payments
            SET status = $2,
                mpesa_receipt_number = $3,
                result_code = $4,
                result_description = $5,
                paid_at = $6,
                updated_at = $7
            WHERE checkout_request_id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        );

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(&settlement.checkout_request_id)
            .bind(settlement.status)
            .bind(&settlement.mpesa_receipt_number)
            .bind(settlement.result_code)
            .bind(&settlement.result_description)
            .bind(settlement.paid_at)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    #[builder]
    pub async fn list_payments_for_user(
        &self,
        user_id: &str,
        params: Option<PaginationParams>,
    ) -> DbResult<Vec<Payment>> {
        let params = params.unwrap_or_default();

        let query = format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE user_id = $1
            ORDER BY created_at {}
            LIMIT $2 OFFSET $3
            "#,
            params.order()
        );

        let payments = sqlx::query_as::<_, Payment>(&query)
            .bind(user_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    /// Fails every payment still `pending` that was created before `created_before`.
    #[builder]
    pub async fn fail_stale_pending_payments(
        &self,
        created_before: DateTime<Utc>,
        reason: &str,
    ) -> DbResult<Vec<Payment>> {
        let now = Utc::now();

        let query = format!(
            r#"
            UPDATE payments
            SET status = 'failed',
                result_description = $2,
                updated_at = $3
            WHERE status = 'pending' AND created_at < $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        );

        let payments = sqlx::query_as::<_, Payment>(&query)
            .bind(created_before)
            .bind(reason)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    /// Successful plan purchases that never got a subscription row.
    #[builder]
    pub async fn list_paid_payments_without_subscription(
        &self,
        limit: i64,
    ) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT p.id, p.user_id, p.plan_id, p.amount, p.method, p.status,
                   p.checkout_request_id, p.merchant_request_id, p.mpesa_receipt_number,
                   p.phone_number, p.account_reference, p.result_code, p.result_description,
                   p.created_at, p.updated_at, p.paid_at
            FROM payments p
            WHERE p.status = 'success'
              AND p.plan_id IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM subscriptions s WHERE s.payment_id = p.id)
            ORDER BY p.paid_at ASC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    #[builder]
    pub async fn create_subscription(
        &self,
        new_subscription: NewSubscription,
    ) -> DbResult<Subscription> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        let query = format!(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_id, payment_id, start_date, end_date,
                status, auto_renew, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $8, $8)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        );

        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .bind(&new_subscription.user_id)
            .bind(new_subscription.plan_id)
            .bind(new_subscription.payment_id)
            .bind(new_subscription.start_date)
            .bind(new_subscription.end_date)
            .bind(new_subscription.auto_renew)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(subscription)
    }

    #[builder]
    pub async fn get_subscription_by_payment(
        &self,
        payment_id: Uuid,
    ) -> DbResult<Option<Subscription>> {
        let query =
            format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE payment_id = $1");

        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(subscription)
    }

    /// Moves every `active` subscription whose end date is before `today` to `expired`.
    #[builder]
    pub async fn expire_due_subscriptions(
        &self,
        today: NaiveDate,
    ) -> DbResult<Vec<ExpiredSubscription>> {
        let now = Utc::now();

        let expired = sqlx::query_as::<_, ExpiredSubscription>(
            r#"
            WITH expired AS (
                UPDATE subscriptions
                SET status = 'expired', updated_at = $2
                WHERE status = 'active' AND end_date < $1
                RETURNING id, user_id, plan_id, end_date
            )
            SELECT e.id, e.user_id, e.plan_id, p.name AS plan_name, e.end_date
            FROM expired e
            JOIN plans p ON p.id = e.plan_id
            "#,
        )
        .bind(today)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(expired)
    }

    // ------------------------------------------------------------------
    // Audit and error logs
    // ------------------------------------------------------------------

    #[builder]
    pub async fn create_audit_log(&self, entry: NewAuditLog) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, action, details, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&entry.user_id)
        .bind(&entry.action)
        .bind(&entry.details)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[builder]
    pub async fn create_error_log(&self, entry: NewErrorLog) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO error_logs (id, source, kind, message, payload, source_ip, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&entry.source)
        .bind(&entry.kind)
        .bind(&entry.message)
        .bind(&entry.payload)
        .bind(&entry.source_ip)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
