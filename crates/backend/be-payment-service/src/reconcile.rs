use be_remote_db::{PeriodEndWrite, SubscriptionStatus};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::PaymentConfig;
use crate::error::PaymentError;
use crate::event::{BillingEvent, CheckoutCompleted, SubscriptionChanged};
use crate::store::{BillingStore, SubscriptionUpsert};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Authenticated but nothing to change; the reason goes to the ledger.
    Ignored(&'static str),
}

/// Applies one billing event to local subscription state.
///
/// Only storage failures are returned as errors. Events that reference
/// nothing we know about resolve to [`Outcome::Ignored`].
pub async fn reconcile<S: BillingStore>(
    store: &S,
    config: &PaymentConfig,
    event: &BillingEvent,
    now: DateTime<Utc>,
) -> Result<Outcome, PaymentError> {
    match event {
        BillingEvent::CheckoutCompleted(session) => {
            checkout_completed(store, config, session, now).await
        }
        BillingEvent::SubscriptionUpdated(sub) | BillingEvent::SubscriptionDeleted(sub) => {
            subscription_changed(store, config, sub, now).await
        }
        BillingEvent::Unhandled => Ok(Outcome::Ignored("unhandled event type")),
    }
}

async fn checkout_completed<S: BillingStore>(
    store: &S,
    config: &PaymentConfig,
    session: &CheckoutCompleted,
    now: DateTime<Utc>,
) -> Result<Outcome, PaymentError> {
    let Some(email) = session.email.as_deref() else {
        info!("Checkout completed without a customer email");
        return Ok(Outcome::Ignored("missing customer email"));
    };
    let Some(subscription_id) = session.subscription_id.as_deref() else {
        info!("Checkout completed without a subscription");
        return Ok(Outcome::Ignored("missing subscription id"));
    };

    let Some(user_id) = store.find_user_id_by_email(email).await? else {
        info!(%subscription_id, "Checkout completed for an email with no user");
        return Ok(Outcome::Ignored("no user for customer email"));
    };

    let plan = session.plan.clone().unwrap_or_else(|| config.default_plan.clone());
    let current_period_end = session
        .period_end
        .map(PeriodEndWrite::Set)
        .unwrap_or_else(|| config.checkout_period_end_fallback.resolve(now));

    store
        .upsert_subscription(SubscriptionUpsert {
            user_id,
            plan: plan.clone(),
            status: SubscriptionStatus::Active,
            stripe_customer_id: session.customer_id.clone(),
            stripe_subscription_id: subscription_id.to_string(),
            current_period_end,
        })
        .await?;

    info!(%user_id, %subscription_id, %plan, "Subscription activated");
    Ok(Outcome::Applied)
}

async fn subscription_changed<S: BillingStore>(
    store: &S,
    config: &PaymentConfig,
    sub: &SubscriptionChanged,
    now: DateTime<Utc>,
) -> Result<Outcome, PaymentError> {
    let status = SubscriptionStatus::from_provider(&sub.status);
    let current_period_end = sub
        .period_end
        .map(PeriodEndWrite::Set)
        .unwrap_or_else(|| config.update_period_end_fallback.resolve(now));

    let touched = store
        .update_subscription_status(&sub.subscription_id, status, current_period_end)
        .await?;

    if touched == 0 {
        info!(subscription_id = %sub.subscription_id, %status, "No local subscription to update");
        return Ok(Outcome::Ignored("no matching subscription"));
    }

    info!(subscription_id = %sub.subscription_id, %status, "Subscription status updated");
    Ok(Outcome::Applied)
}
