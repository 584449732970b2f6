//! Billing facts pulled out of verified Stripe webhook events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use stripe_shared::{CheckoutSession, Subscription};
use stripe_webhook::EventObject;

/// A completed checkout session, reduced to what reconciliation reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub email: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub plan: Option<String>,
    /// Only known when Stripe expanded the subscription on the session.
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChanged {
    pub subscription_id: String,
    pub status: String,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionUpdated(SubscriptionChanged),
    SubscriptionDeleted(SubscriptionChanged),
    Unhandled,
}

impl BillingEvent {
    pub fn from_event_object(object: EventObject) -> Self {
        match object {
            EventObject::CheckoutSessionCompleted(session) => {
                BillingEvent::CheckoutCompleted(CheckoutCompleted::from_session(&session))
            }
            EventObject::CustomerSubscriptionUpdated(sub) => {
                BillingEvent::SubscriptionUpdated(SubscriptionChanged::from_subscription(&sub))
            }
            EventObject::CustomerSubscriptionDeleted(sub) => {
                BillingEvent::SubscriptionDeleted(SubscriptionChanged::from_subscription(&sub))
            }
            _ => BillingEvent::Unhandled,
        }
    }
}

impl CheckoutCompleted {
    pub fn from_session(session: &CheckoutSession) -> Self {
        let email = session.customer_email.as_deref().or_else(|| {
            session
                .customer_details
                .as_ref()
                .and_then(|details| details.email.as_deref())
        });

        Self {
            email: non_blank(email),
            customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
            subscription_id: session
                .subscription
                .as_ref()
                .map(|s| s.id().to_string())
                .filter(|id| !id.is_empty()),
            plan: plan_from_metadata(session.metadata.as_ref()),
            period_end: session
                .subscription
                .as_ref()
                .and_then(|s| s.as_object())
                .and_then(subscription_period_end),
        }
    }
}

impl SubscriptionChanged {
    pub fn from_subscription(sub: &Subscription) -> Self {
        Self {
            subscription_id: sub.id.to_string(),
            status: sub.status.as_str().to_string(),
            period_end: subscription_period_end(sub),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Stripe sends `"metadata": null` on sessions created without any.
fn plan_from_metadata(metadata: Option<&HashMap<String, String>>) -> Option<String> {
    non_blank(metadata.and_then(|m| m.get("plan")).map(String::as_str))
}

fn subscription_period_end(sub: &Subscription) -> Option<DateTime<Utc>> {
    sub.items
        .data
        .first()
        .and_then(|item| DateTime::from_timestamp(item.current_period_end, 0))
}
