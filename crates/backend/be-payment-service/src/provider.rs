use std::collections::HashMap;

use stripe::{ClientBuilder, RequestStrategy};
use stripe_checkout::CheckoutSessionMode;
use stripe_checkout::checkout_session::{CreateCheckoutSession, CreateCheckoutSessionLineItems};

use crate::error::PaymentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub plan: String,
    pub price_id: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Creates hosted checkout sessions and returns the URL to send the buyer to.
pub trait CheckoutProvider: Send + Sync + 'static {
    fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> impl std::future::Future<Output = Result<String, PaymentError>> + Send;
}

/// Stripe-backed provider. Without a secret key every call fails with a
/// configuration error.
pub struct StripeCheckout {
    client: Option<stripe::Client>,
}

impl StripeCheckout {
    pub fn new(secret_key: Option<&str>) -> Result<Self, PaymentError> {
        let client = secret_key
            .map(|key| {
                ClientBuilder::new(key)
                    .request_strategy(RequestStrategy::ExponentialBackoff(3))
                    .build()
                    .map_err(|e| {
                        PaymentError::Config(format!("Failed to build Stripe client: {e}"))
                    })
            })
            .transpose()?;
        Ok(Self { client })
    }
}

impl CheckoutProvider for StripeCheckout {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<String, PaymentError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| PaymentError::Config("STRIPE_SECRET_KEY is not set".into()))?;

        let line_items = vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price: Some(request.price_id),
            ..Default::default()
        }];

        let metadata = HashMap::from([("plan".to_string(), request.plan)]);

        let mut req = CreateCheckoutSession::new()
            .mode(CheckoutSessionMode::Subscription)
            .line_items(line_items)
            .success_url(&request.success_url)
            .cancel_url(&request.cancel_url)
            .metadata(metadata);

        if let Some(ref email) = request.customer_email {
            req = req.customer_email(email);
        }

        let session = req.send(client).await?;

        session
            .url
            .ok_or(PaymentError::MissingField("checkout session URL"))
    }
}
