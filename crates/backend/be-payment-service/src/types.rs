use be_remote_db::Subscription;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// The caller's plan. Users without a subscription row are on `free`.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub plan: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionSummary {
    pub fn free() -> Self {
        Self {
            plan: "free".to_string(),
            status: "none".to_string(),
            current_period_end: None,
        }
    }
}

impl From<Subscription> for SubscriptionSummary {
    fn from(sub: Subscription) -> Self {
        Self {
            plan: sub.plan,
            status: sub.status.to_string(),
            current_period_end: sub.current_period_end,
        }
    }
}
