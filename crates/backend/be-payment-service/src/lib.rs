use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use be_auth_core::SessionAuth;
use be_remote_db::DatabaseManager;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

mod analytics;
pub mod config;
pub mod error;
pub mod event;
pub mod handlers;
pub mod provider;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod types;

use provider::CheckoutProvider;
use service::AppState;
use store::BillingStore;

pub fn create_router<S: BillingStore, C: CheckoutProvider>(
    state: Arc<AppState<S, C>>,
    session_auth: SessionAuth,
) -> Result<Router> {
    let checkout_governor = GovernorConfigBuilder::default()
        .per_second(6)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid checkout rate limit"))?;

    let checkout_route = Router::new()
        .route(
            "/api/stripe/checkout",
            post(handlers::create_checkout_session::<S, C>),
        )
        .layer(GovernorLayer::new(Arc::new(checkout_governor)));

    let router = checkout_route
        .route("/api/subscription", get(handlers::get_subscription::<S, C>))
        .route("/api/stripe/webhook", post(handlers::handle_webhook::<S, C>))
        .layer(Extension(session_auth))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

pub fn init_payment_service(db: Arc<DatabaseManager>, session_auth: SessionAuth) -> Result<Router> {
    debug!("Initializing payment service");

    let state = Arc::new(AppState::from_env(db).context("Failed to create payment service state")?);

    create_router(state, session_auth)
}

pub use config::{PaymentConfig, PeriodEndFallback};
pub use error::PaymentError;
pub use types::{CreateCheckoutRequest, CreateCheckoutResponse, SubscriptionSummary, WebhookAck};

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use be_auth_core::{
        AuthCoreError, AuthenticatedUser, SessionConfig, SessionResolver, hash_session_token,
    };
    use be_remote_db::{SubscriptionStatus, WebhookEventOutcome};
    use chrono::Utc;
    use serde_json::{Value, json};
    use stripe_webhook::Webhook;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::event::{BillingEvent, CheckoutCompleted};
    use crate::handlers::apply_event;
    use crate::provider::recording::RecordingCheckout;
    use crate::store::memory::MemoryBillingStore;

    const WEBHOOK_SECRET: &str = "whsec_test";
    const SESSION_TOKEN: &str = "signed-in-token";
    const BUYER: &str = "buyer@example.com";

    struct OneSession {
        user: AuthenticatedUser,
    }

    #[async_trait]
    impl SessionResolver for OneSession {
        async fn resolve_session(
            &self,
            token_hash: &[u8],
        ) -> Result<Option<AuthenticatedUser>, AuthCoreError> {
            Ok((token_hash == hash_session_token(SESSION_TOKEN).as_slice())
                .then(|| self.user.clone()))
        }
    }

    struct BrokenSessions;

    #[async_trait]
    impl SessionResolver for BrokenSessions {
        async fn resolve_session(
            &self,
            _token_hash: &[u8],
        ) -> Result<Option<AuthenticatedUser>, AuthCoreError> {
            Err(AuthCoreError::Random("session store unavailable".into()))
        }
    }

    fn config() -> PaymentConfig {
        PaymentConfig {
            stripe_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            plans: BTreeMap::from([("pro".to_string(), "price_pro".to_string())]),
            ..PaymentConfig::default()
        }
    }

    struct Harness {
        state: Arc<AppState<MemoryBillingStore, RecordingCheckout>>,
        store: Arc<MemoryBillingStore>,
        user_id: Uuid,
    }

    impl Harness {
        fn new(config: PaymentConfig) -> Self {
            let (store, user_id) = MemoryBillingStore::with_user(BUYER);
            let store = Arc::new(store);
            let state = Arc::new(AppState::new(
                config,
                store.clone(),
                RecordingCheckout::default(),
            ));
            Self {
                state,
                store,
                user_id,
            }
        }

        fn router(&self) -> Router {
            let resolver = OneSession {
                user: AuthenticatedUser {
                    user_id: self.user_id,
                    email: BUYER.to_string(),
                    name: None,
                    image: None,
                    session_expires_at: Utc::now() + chrono::Duration::days(1),
                },
            };
            self.router_with(Arc::new(resolver))
        }

        fn router_with(&self, resolver: Arc<dyn SessionResolver>) -> Router {
            let session_auth = SessionAuth::new(resolver, Arc::new(SessionConfig::default()));
            create_router(self.state.clone(), session_auth).unwrap()
        }

        fn requests(&self) -> Vec<provider::CheckoutRequest> {
            self.state.checkout.requests.lock().clone()
        }
    }

    /// An event type the service does not act on, with a payload Stripe's
    /// typed models accept.
    fn external_account_created() -> String {
        json!({
            "id": "evt_test",
            "object": "event",
            "api_version": "2017-05-25",
            "created": 1533204620,
            "livemode": false,
            "pending_webhooks": 1,
            "data": {
                "object": {
                    "object": "bank_account",
                    "country": "us",
                    "currency": "usd",
                    "id": "ba_test",
                    "last4": "6789",
                    "status": "verified"
                }
            },
            "type": "account.external_account.created"
        })
        .to_string()
    }

    fn completed_checkout() -> BillingEvent {
        BillingEvent::CheckoutCompleted(CheckoutCompleted {
            email: Some(BUYER.to_string()),
            customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_1".to_string()),
            plan: Some("pro".to_string()),
            period_end: None,
        })
    }

    fn webhook_request(payload: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/stripe/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        builder.body(Body::from(payload.to_string())).unwrap()
    }

    fn signed(payload: &str) -> Option<String> {
        Some(Webhook::generate_test_header(payload, WEBHOOK_SECRET, None))
    }

    fn checkout_request(plan: &str, origin: Option<&str>, signed_in: bool) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/stripe/checkout")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.7");
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        if signed_in {
            builder = builder.header("cookie", format!("cc_session={SESSION_TOKEN}"));
        }
        builder
            .body(Body::from(json!({ "plan": plan }).to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn webhook_without_signature_is_rejected() {
        let harness = Harness::new(config());
        let payload = external_account_created();

        let response = harness
            .router()
            .oneshot(webhook_request(&payload, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.store.ledger().is_empty());
    }

    #[tokio::test]
    async fn webhook_with_wrong_secret_changes_nothing() {
        let harness = Harness::new(config());
        let payload = external_account_created();
        let forged = Webhook::generate_test_header(&payload, "whsec_other", None);

        let response = harness
            .router()
            .oneshot(webhook_request(&payload, Some(forged)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.store.ledger().is_empty());
    }

    #[tokio::test]
    async fn webhook_with_garbled_signature_is_rejected() {
        let harness = Harness::new(config());
        let payload = external_account_created();

        let response = harness
            .router()
            .oneshot(webhook_request(&payload, Some("t=123,v1=badsig".to_string())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_with_stale_timestamp_is_rejected() {
        let harness = Harness::new(config());
        let payload = external_account_created();
        let stale = Webhook::generate_test_header(
            &payload,
            WEBHOOK_SECRET,
            Some(Utc::now().timestamp() - 3600),
        );

        let response = harness
            .router()
            .oneshot(webhook_request(&payload, Some(stale)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.store.ledger().is_empty());
    }

    #[tokio::test]
    async fn webhook_without_configured_secret_is_a_server_error() {
        let harness = Harness::new(PaymentConfig {
            stripe_webhook_secret: None,
            ..config()
        });
        let payload = external_account_created();

        let response = harness
            .router()
            .oneshot(webhook_request(&payload, signed(&payload)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unhandled_event_types_are_acknowledged_and_ignored() {
        let harness = Harness::new(config());
        let payload = external_account_created();

        let response = harness
            .router()
            .oneshot(webhook_request(&payload, signed(&payload)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "received": true }));
        let ledger = harness.store.ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].event_id, "evt_test");
        assert_eq!(ledger[0].event_type, "account.external_account.created");
        assert_eq!(ledger[0].outcome, WebhookEventOutcome::Ignored);
        assert!(harness.store.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn signed_but_unparseable_body_is_a_bad_request() {
        let harness = Harness::new(config());
        let payload = "not json";

        let response = harness
            .router()
            .oneshot(webhook_request(payload, signed(payload)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.store.ledger().is_empty());
    }

    #[tokio::test]
    async fn applied_checkout_activates_subscription() {
        let harness = Harness::new(config());

        let ack = apply_event(
            &harness.state,
            "evt_1",
            "checkout.session.completed",
            completed_checkout(),
        )
        .await
        .unwrap();
        assert!(ack.received);

        let subs = harness.store.subscriptions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].user_id, harness.user_id);
        assert_eq!(subs[0].plan, "pro");
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
        assert_eq!(subs[0].stripe_subscription_id, "sub_1");

        let ledger = harness.store.ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].event_id, "evt_1");
        assert_eq!(ledger[0].outcome, WebhookEventOutcome::Applied);
    }

    #[tokio::test]
    async fn redelivered_checkout_keeps_one_row() {
        let harness = Harness::new(config());

        for _ in 0..2 {
            apply_event(
                &harness.state,
                "evt_1",
                "checkout.session.completed",
                completed_checkout(),
            )
            .await
            .unwrap();
        }

        assert_eq!(harness.store.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_asks_stripe_to_retry_by_default() {
        let harness = Harness::new(config());
        harness.store.set_fail_writes(true);

        let err = apply_event(
            &harness.state,
            "evt_1",
            "checkout.session.completed",
            completed_checkout(),
        )
        .await
        .unwrap_err();

        assert!(err.is_storage());
        assert!(harness.store.subscriptions().is_empty());
        let ledger = harness.store.ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].outcome, WebhookEventOutcome::Failed);
        assert!(ledger[0].error.is_some());
    }

    #[tokio::test]
    async fn storage_failure_is_acknowledged_when_configured() {
        let harness = Harness::new(PaymentConfig {
            ack_on_apply_failure: true,
            ..config()
        });
        harness.store.set_fail_writes(true);

        let ack = apply_event(
            &harness.state,
            "evt_1",
            "checkout.session.completed",
            completed_checkout(),
        )
        .await
        .unwrap();

        assert!(ack.received);
        let ledger = harness.store.ledger();
        assert_eq!(ledger[0].outcome, WebhookEventOutcome::Failed);
    }

    #[tokio::test]
    async fn checkout_for_unknown_plan_never_reaches_stripe() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(checkout_request("platinum", None, false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected_even_when_session_lookup_fails() {
        let harness = Harness::new(config());

        let response = harness
            .router_with(Arc::new(BrokenSessions))
            .oneshot(checkout_request("platinum", None, true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.requests().is_empty());
    }

    #[tokio::test]
    async fn failed_session_lookup_checks_out_anonymously() {
        let harness = Harness::new(config());

        let response = harness
            .router_with(Arc::new(BrokenSessions))
            .oneshot(checkout_request("pro", None, true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(harness.requests()[0].customer_email, None);
    }

    #[tokio::test]
    async fn anonymous_checkout_uses_allowlisted_origin() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(checkout_request("Pro", Some("https://commandcore.app"), false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["url"], "https://checkout.stripe.com/c/pay/cs_test_123");

        let requests = harness.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].plan, "pro");
        assert_eq!(requests[0].price_id, "price_pro");
        assert_eq!(requests[0].customer_email, None);
        assert_eq!(
            requests[0].success_url,
            "https://commandcore.app/dashboard?checkout=success&session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(
            requests[0].cancel_url,
            "https://commandcore.app/pricing?checkout=canceled"
        );
    }

    #[tokio::test]
    async fn checkout_ignores_foreign_origin() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(checkout_request("pro", Some("https://evil.example"), false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let requests = harness.requests();
        assert!(
            requests[0]
                .success_url
                .starts_with("http://localhost:3000/dashboard")
        );
    }

    #[tokio::test]
    async fn signed_in_checkout_carries_customer_email() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(checkout_request("pro", None, true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            harness.requests()[0].customer_email.as_deref(),
            Some(BUYER)
        );
    }

    #[tokio::test]
    async fn subscription_requires_a_session() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/subscription")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn subscription_defaults_to_free() {
        let harness = Harness::new(config());

        let response = harness
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/subscription")
                    .header("cookie", format!("cc_session={SESSION_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "plan": "free", "status": "none" })
        );
    }

    #[tokio::test]
    async fn subscription_reflects_reconciled_checkout() {
        let harness = Harness::new(config());
        apply_event(
            &harness.state,
            "evt_1",
            "checkout.session.completed",
            completed_checkout(),
        )
        .await
        .unwrap();

        let response = harness
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/subscription")
                    .header("cookie", format!("cc_session={SESSION_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["plan"], "pro");
        assert_eq!(body["status"], "active");
        assert!(body["currentPeriodEnd"].is_string());
    }
}
