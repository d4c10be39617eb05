pub mod activator;
pub mod error;
pub mod store;

pub use activator::{
    Activation, ExpiryReport, ReconcileReport, SubscriptionActivator, subscription_end_date,
};
pub use error::SubscriptionError;
pub use store::SubscriptionStore;
