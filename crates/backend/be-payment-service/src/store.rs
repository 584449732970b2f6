use be_remote_db::{
    DatabaseManager, PeriodEndWrite, Subscription, SubscriptionStatus, WebhookEventOutcome,
};
use uuid::Uuid;

use crate::error::PaymentError;

/// A subscription write keyed by the Stripe subscription id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpsert {
    pub user_id: Uuid,
    pub plan: String,
    pub status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: String,
    pub current_period_end: PeriodEndWrite,
}

/// Persistence used by billing handlers.
///
/// Writes must be idempotent per `stripe_subscription_id`: Stripe delivers
/// events at least once and possibly out of order.
pub trait BillingStore: Send + Sync + 'static {
    fn find_user_id_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<Uuid>, PaymentError>> + Send;

    fn upsert_subscription(
        &self,
        write: SubscriptionUpsert,
    ) -> impl std::future::Future<Output = Result<(), PaymentError>> + Send;

    /// Returns the number of rows touched (zero or one).
    fn update_subscription_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        current_period_end: PeriodEndWrite,
    ) -> impl std::future::Future<Output = Result<u64, PaymentError>> + Send;

    fn current_subscription(
        &self,
        user_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Subscription>, PaymentError>> + Send;

    fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        outcome: WebhookEventOutcome,
        error: Option<String>,
    ) -> impl std::future::Future<Output = Result<(), PaymentError>> + Send;
}

impl BillingStore for DatabaseManager {
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<Uuid>, PaymentError> {
        Ok(DatabaseManager::find_user_id_by_email(self, email).await?)
    }

    async fn upsert_subscription(&self, write: SubscriptionUpsert) -> Result<(), PaymentError> {
        DatabaseManager::upsert_subscription(self)
            .user_id(write.user_id)
            .plan(&write.plan)
            .status(write.status)
            .maybe_stripe_customer_id(write.stripe_customer_id.as_deref())
            .stripe_subscription_id(&write.stripe_subscription_id)
            .current_period_end(write.current_period_end)
            .call()
            .await?;
        Ok(())
    }

    async fn update_subscription_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        current_period_end: PeriodEndWrite,
    ) -> Result<u64, PaymentError> {
        Ok(DatabaseManager::update_subscription_status(self)
            .stripe_subscription_id(stripe_subscription_id)
            .status(status)
            .current_period_end(current_period_end)
            .call()
            .await?)
    }

    async fn current_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, PaymentError> {
        Ok(self.get_current_subscription(user_id).await?)
    }

    async fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        outcome: WebhookEventOutcome,
        error: Option<String>,
    ) -> Result<(), PaymentError> {
        DatabaseManager::record_webhook_event(self)
            .event_id(event_id)
            .event_type(event_type)
            .outcome(outcome)
            .maybe_error(error)
            .call()
            .await?;
        Ok(())
    }
}
