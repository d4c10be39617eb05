use be_remote_db::DbError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Plan not found: {0}")]
    PlanNotFound(Uuid),

    #[error("Plan {plan_id} has an invalid validity period of {validity_days} days")]
    InvalidPlan { plan_id: Uuid, validity_days: i32 },

    #[error("Storage error: {0}")]
    Db(#[from] DbError),
}

impl SubscriptionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PlanNotFound(_))
    }
}
