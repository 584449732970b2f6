use std::sync::Arc;

use be_remote_db::DatabaseManager;

use crate::config::PaymentConfig;
use crate::error::PaymentError;
use crate::provider::{CheckoutProvider, StripeCheckout};
use crate::store::BillingStore;

pub struct AppState<S: BillingStore = DatabaseManager, C: CheckoutProvider = StripeCheckout> {
    pub config: PaymentConfig,
    pub store: Arc<S>,
    pub checkout: C,
}

impl AppState {
    pub fn from_env(db: Arc<DatabaseManager>) -> Result<Self, PaymentError> {
        let config = PaymentConfig::from_env()?;
        let checkout = StripeCheckout::new(config.stripe_secret_key.as_deref())?;
        Ok(Self {
            config,
            store: db,
            checkout,
        })
    }
}

impl<S: BillingStore, C: CheckoutProvider> AppState<S, C> {
    pub fn new(config: PaymentConfig, store: Arc<S>, checkout: C) -> Self {
        Self {
            config,
            store,
            checkout,
        }
    }
}
