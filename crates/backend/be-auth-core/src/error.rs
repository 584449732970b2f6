use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthCoreError {
    #[error("Database error: {0}")]
    Database(#[from] be_remote_db::DbError),

    #[error("Failed to generate random bytes: {0}")]
    Random(String),
}

/// Why a request could not be tied to a signed-in user.
#[derive(Debug, thiserror::Error)]
pub enum AuthRejection {
    #[error("Not signed in")]
    MissingSession,

    #[error("Session is invalid or expired")]
    InvalidSession,

    #[error("Session authentication is not configured")]
    Misconfigured,

    #[error("Session lookup failed: {0}")]
    Backend(#[from] AuthCoreError),
}

impl AuthRejection {
    /// Whether the request simply carries no usable session, as opposed to
    /// the lookup itself failing.
    pub fn is_anonymous(&self) -> bool {
        matches!(
            self,
            AuthRejection::MissingSession | AuthRejection::InvalidSession
        )
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthRejection::MissingSession | AuthRejection::InvalidSession => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AuthRejection::Misconfigured | AuthRejection::Backend(_) => {
                tracing::error!(error = %self, "Session authentication failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
