use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] be_remote_db::DbError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    /// Failures to durably apply an authenticated event.
    pub fn is_storage(&self) -> bool {
        matches!(self, PaymentError::Storage(_))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PaymentError::Stripe(stripe::StripeError::Stripe(api_error, code)) => {
                let status = match code {
                    400 => StatusCode::BAD_REQUEST,
                    401 => StatusCode::UNAUTHORIZED,
                    402 => StatusCode::PAYMENT_REQUIRED,
                    404 => StatusCode::NOT_FOUND,
                    429 => StatusCode::TOO_MANY_REQUESTS,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = api_error
                    .message
                    .clone()
                    .unwrap_or_else(|| "Payment processing error".to_string());
                (status, message)
            }
            PaymentError::WebhookSignatureInvalid
            | PaymentError::InvalidPayload(_)
            | PaymentError::UnknownPlan(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            PaymentError::MissingField(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            PaymentError::Stripe(_)
            | PaymentError::Config(_)
            | PaymentError::Storage(_)
            | PaymentError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %self, "Payment service error");
        } else {
            tracing::warn!(%status, error = %self, "Payment request rejected");
        }

        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}
