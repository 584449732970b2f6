use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use be_auth_core::{AuthRejection, AuthUser};
use be_remote_db::WebhookEventOutcome;
use chrono::Utc;
use stripe_webhook::{Webhook, WebhookError};
use tracing::{error, info, warn};

use crate::analytics;
use crate::error::PaymentError;
use crate::event::BillingEvent;
use crate::provider::{CheckoutProvider, CheckoutRequest};
use crate::reconcile::{Outcome, reconcile};
use crate::service::AppState;
use crate::store::BillingStore;
use crate::types::{CreateCheckoutRequest, CreateCheckoutResponse, SubscriptionSummary, WebhookAck};

// ---------------------------------------------------------------------------
// POST /api/stripe/checkout
// ---------------------------------------------------------------------------

/// Creates a Stripe Checkout Session for a plan and returns its URL. Signed-in
/// callers have their email attached to the session; a failed session lookup
/// falls back to an anonymous checkout.
pub async fn create_checkout_session<S: BillingStore, C: CheckoutProvider>(
    State(state): State<Arc<AppState<S, C>>>,
    user: Result<AuthUser, AuthRejection>,
    headers: HeaderMap,
    Json(body): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, PaymentError> {
    let plan = body.plan.trim().to_ascii_lowercase();

    let Some(price_id) = state.config.price_id_for(&plan) else {
        analytics::track_checkout_session_creation_failed(&plan, "unknown_plan");
        return Err(PaymentError::UnknownPlan(body.plan));
    };

    let origin = state.config.redirect_origin(
        headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok()),
    );

    // Stripe substitutes the literal {CHECKOUT_SESSION_ID} on redirect.
    let success_url =
        format!("{origin}/dashboard?checkout=success&session_id={{CHECKOUT_SESSION_ID}}");
    let cancel_url = format!("{origin}/pricing?checkout=canceled");

    let customer_email = match user {
        Ok(AuthUser(user)) => Some(user.email),
        Err(rejection) if rejection.is_anonymous() => None,
        Err(rejection) => {
            warn!(error = %rejection, "Session lookup failed, continuing checkout anonymously");
            None
        }
    };
    let signed_in = customer_email.is_some();

    let request = CheckoutRequest {
        plan: plan.clone(),
        price_id: price_id.to_string(),
        customer_email,
        success_url,
        cancel_url,
    };

    match state.checkout.create_checkout_session(request).await {
        Ok(url) => {
            info!(%plan, signed_in, "Checkout session created");
            analytics::track_checkout_session_created(&plan, signed_in);
            Ok(Json(CreateCheckoutResponse { url }))
        }
        Err(e) => {
            let kind = match &e {
                PaymentError::Stripe(_) => "stripe",
                PaymentError::Config(_) => "config",
                _ => "other",
            };
            analytics::track_checkout_session_creation_failed(&plan, kind);
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// GET /api/subscription
// ---------------------------------------------------------------------------

pub async fn get_subscription<S: BillingStore, C: CheckoutProvider>(
    State(state): State<Arc<AppState<S, C>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<SubscriptionSummary>, PaymentError> {
    let summary = state
        .store
        .current_subscription(user.user_id)
        .await?
        .map(SubscriptionSummary::from)
        .unwrap_or_else(SubscriptionSummary::free);

    analytics::track_subscription_status_checked(&summary.plan, &summary.status);

    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// POST /api/stripe/webhook
// ---------------------------------------------------------------------------

/// Verifies a Stripe webhook event and applies it.
pub async fn handle_webhook<S: BillingStore, C: CheckoutProvider>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, PaymentError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| PaymentError::Config("STRIPE_WEBHOOK_SECRET is not set".into()))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(PaymentError::WebhookSignatureInvalid)?;

    let event = Webhook::construct_event(&body, signature, secret).map_err(|e| match e {
        WebhookError::BadParse(_) => PaymentError::InvalidPayload(e.to_string()),
        _ => {
            warn!(reason = %e, "Rejected webhook signature");
            PaymentError::WebhookSignatureInvalid
        }
    })?;

    let event_id = event.id.to_string();
    let event_type = event.type_.to_string();
    let billing_event = BillingEvent::from_event_object(event.data.object);

    apply_event(&state, &event_id, &event_type, billing_event).await
}

/// Applies a verified billing event and records the outcome in the ledger.
///
/// Storage failures answer 500 so Stripe redelivers, unless
/// `ack_on_apply_failure` is set, in which case the event is acknowledged and
/// left in the ledger as `failed`.
pub async fn apply_event<S: BillingStore, C: CheckoutProvider>(
    state: &Arc<AppState<S, C>>,
    event_id: &str,
    event_type: &str,
    billing_event: BillingEvent,
) -> Result<Json<WebhookAck>, PaymentError> {
    let result = match billing_event {
        BillingEvent::Unhandled => {
            warn!(%event_type, "Unhandled webhook event");
            Ok(Outcome::Ignored("unhandled event type"))
        }
        billing_event => {
            reconcile(
                state.store.as_ref(),
                &state.config,
                &billing_event,
                Utc::now(),
            )
            .await
        }
    };

    let ack = Json(WebhookAck { received: true });

    match result {
        Ok(outcome) => {
            let (ledger_outcome, note) = match outcome {
                Outcome::Applied => (WebhookEventOutcome::Applied, None),
                Outcome::Ignored(reason) => (WebhookEventOutcome::Ignored, Some(reason.to_string())),
            };
            record_outcome(state, event_id, event_type, ledger_outcome, note).await;
            analytics::track_webhook_processed(event_type, &ledger_outcome.to_string());
            Ok(ack)
        }
        Err(e) => {
            record_outcome(
                state,
                event_id,
                event_type,
                WebhookEventOutcome::Failed,
                Some(e.to_string()),
            )
            .await;
            analytics::track_webhook_processed(event_type, "failed");

            if e.is_storage() && state.config.ack_on_apply_failure {
                error!(
                    %event_id,
                    %event_type,
                    error = %e,
                    "Failed to apply webhook event, acknowledging anyway"
                );
                return Ok(ack);
            }

            error!(%event_id, %event_type, error = %e, "Failed to apply webhook event");
            Err(e)
        }
    }
}

async fn record_outcome<S: BillingStore, C: CheckoutProvider>(
    state: &Arc<AppState<S, C>>,
    event_id: &str,
    event_type: &str,
    outcome: WebhookEventOutcome,
    note: Option<String>,
) {
    if let Err(e) = state
        .store
        .record_webhook_event(event_id, event_type, outcome, note)
        .await
    {
        warn!(%event_id, error = %e, "Failed to record webhook event");
    }
}
