use std::collections::BTreeMap;
use std::str::FromStr;

use axum::http::HeaderValue;
use be_remote_db::PeriodEndWrite;
use chrono::{DateTime, Utc};

use crate::error::PaymentError;

const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,https://commandcore.app";

/// What to store as the current period end when an event carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodEndFallback {
    Now,
    Epoch,
    Keep,
}

impl PeriodEndFallback {
    pub fn resolve(self, now: DateTime<Utc>) -> PeriodEndWrite {
        match self {
            PeriodEndFallback::Now => PeriodEndWrite::Set(now),
            PeriodEndFallback::Epoch => PeriodEndWrite::Set(DateTime::<Utc>::UNIX_EPOCH),
            PeriodEndFallback::Keep => PeriodEndWrite::Keep,
        }
    }
}

impl FromStr for PeriodEndFallback {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "now" => Ok(PeriodEndFallback::Now),
            "epoch" => Ok(PeriodEndFallback::Epoch),
            "keep" => Ok(PeriodEndFallback::Keep),
            other => Err(PaymentError::Config(format!(
                "invalid period end fallback '{other}', expected now, epoch or keep"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub frontend_url: String,
    pub allowed_origins: Vec<String>,
    /// Plan name to Stripe price id.
    pub plans: BTreeMap<String, String>,
    pub default_plan: String,
    pub checkout_period_end_fallback: PeriodEndFallback,
    pub update_period_end_fallback: PeriodEndFallback,
    pub ack_on_apply_failure: bool,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            plans: BTreeMap::new(),
            default_plan: "pro".to_string(),
            checkout_period_end_fallback: PeriodEndFallback::Now,
            update_period_end_fallback: PeriodEndFallback::Epoch,
            ack_on_apply_failure: false,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl PaymentConfig {
    pub fn from_env() -> Result<Self, PaymentError> {
        let defaults = Self::default();

        let stripe_secret_key = non_empty_var("STRIPE_SECRET_KEY");
        if stripe_secret_key.is_none() {
            tracing::warn!("STRIPE_SECRET_KEY not set, checkout is unavailable");
        }

        let stripe_webhook_secret = non_empty_var("STRIPE_WEBHOOK_SECRET");
        if stripe_webhook_secret.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set, webhooks will be rejected");
        }

        let frontend_url = non_empty_var("FRONTEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.frontend_url);

        HeaderValue::from_str(&frontend_url).map_err(|e| {
            PaymentError::Config(format!(
                "FRONTEND_URL '{frontend_url}' is not a valid header value: {e}"
            ))
        })?;

        let allowed_origins = non_empty_var("CORS_ALLOWED_ORIGINS")
            .map(|raw| split_origins(&raw))
            .unwrap_or(defaults.allowed_origins);

        let mut plans = BTreeMap::new();
        for (plan, var) in [
            ("pro", "STRIPE_PRO_PRICE_ID"),
            ("enterprise", "STRIPE_ENTERPRISE_PRICE_ID"),
        ] {
            match non_empty_var(var) {
                Some(price_id) => {
                    plans.insert(plan.to_string(), price_id);
                }
                None => tracing::warn!("{var} not set, plan '{plan}' is unavailable"),
            }
        }

        let default_plan = non_empty_var("BILLING_DEFAULT_PLAN").unwrap_or(defaults.default_plan);

        let checkout_period_end_fallback = non_empty_var("BILLING_CHECKOUT_PERIOD_END_FALLBACK")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(defaults.checkout_period_end_fallback);

        let update_period_end_fallback = non_empty_var("BILLING_UPDATE_PERIOD_END_FALLBACK")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(defaults.update_period_end_fallback);

        let ack_on_apply_failure = non_empty_var("BILLING_ACK_ON_APPLY_FAILURE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.ack_on_apply_failure);

        Ok(Self {
            stripe_secret_key,
            stripe_webhook_secret,
            frontend_url,
            allowed_origins,
            plans,
            default_plan,
            checkout_period_end_fallback,
            update_period_end_fallback,
            ack_on_apply_failure,
        })
    }

    pub fn price_id_for(&self, plan: &str) -> Option<&str> {
        self.plans.get(plan).map(String::as_str)
    }

    /// Base URL for checkout redirects: the caller's origin when it is
    /// allowlisted, otherwise the configured frontend.
    pub fn redirect_origin<'a>(&'a self, origin: Option<&'a str>) -> &'a str {
        origin
            .map(|o| o.trim_end_matches('/'))
            .filter(|o| self.allowed_origins.iter().any(|allowed| allowed == o))
            .unwrap_or(&self.frontend_url)
    }
}
