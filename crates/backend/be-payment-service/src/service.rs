use std::sync::Arc;

use be_mpesa::{MpesaClient, MpesaConfig, StkPushGateway};
use be_remote_db::DatabaseManager;
use be_subscription::SubscriptionActivator;

use crate::callback::CallbackReceiver;
use crate::config::PaymentConfig;
use crate::error::PaymentError;
use crate::initiator::PaymentInitiator;
use crate::reaper::StalePaymentReaper;
use crate::store::PaymentStore;

pub struct AppState<S = DatabaseManager, G = MpesaClient> {
    pub config: PaymentConfig,
    pub store: Arc<S>,
    pub initiator: PaymentInitiator<S, G>,
    pub receiver: CallbackReceiver<S>,
    pub activator: SubscriptionActivator<S>,
}

impl AppState {
    pub fn from_env(db: Arc<DatabaseManager>) -> Result<Self, PaymentError> {
        let config = PaymentConfig::from_env()?;
        let mpesa = MpesaClient::new(MpesaConfig::from_env()?)?;
        Ok(Self::new(config, db, Arc::new(mpesa)))
    }
}

impl<S: PaymentStore, G: StkPushGateway> AppState<S, G> {
    pub fn new(config: PaymentConfig, store: Arc<S>, gateway: Arc<G>) -> Self {
        let activator = SubscriptionActivator::new(store.clone());
        let initiator = PaymentInitiator::new(
            store.clone(),
            gateway,
            config.transaction_description.clone(),
        );
        let receiver = CallbackReceiver::new(store.clone(), activator.clone());

        Self {
            config,
            store,
            initiator,
            receiver,
            activator,
        }
    }

    pub fn reaper(&self) -> StalePaymentReaper<S> {
        StalePaymentReaper::new(self.store.clone(), self.config.pending_payment_ttl)
    }
}
