use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use be_remote_db::OAuthProvider;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::oauth::OAuthError;

#[derive(Debug, Error)]
pub enum AuthError {
    // 400
    #[error("{0}")]
    InvalidInput(String),
    #[error("Invalid or expired state parameter")]
    InvalidState,

    // 403
    #[error("Email address is not verified")]
    EmailNotVerified,

    // 404
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("{0} sign-in is not configured")]
    ProviderNotConfigured(OAuthProvider),

    // 502
    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    // 500
    #[error("Database error: {0}")]
    Database(#[from] be_remote_db::DbError),
    #[error("Session error: {0}")]
    Session(#[from] be_auth_core::AuthCoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::InvalidInput(_) | AuthError::InvalidState => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AuthError::EmailNotVerified => (StatusCode::FORBIDDEN, self.to_string()),
            AuthError::UnknownProvider(_) | AuthError::ProviderNotConfigured(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AuthError::OAuth(e) => {
                error!("OAuth error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Identity provider request failed".to_string(),
                )
            }
            AuthError::Database(e) => {
                error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }
            AuthError::Session(e) => {
                error!("Session error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
            AuthError::Internal(msg) => {
                error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
