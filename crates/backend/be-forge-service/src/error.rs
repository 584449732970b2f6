use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: Uuid },

    #[error("{0}")]
    InvalidInput(String),
}

impl ForgeError {
    pub fn not_found(resource: &'static str, id: Uuid) -> Self {
        ForgeError::NotFound { resource, id }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ForgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            ForgeError::NotFound { .. } => StatusCode::NOT_FOUND,
            ForgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        };
        warn!(%status, "Forge request rejected: {self}");

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_resource() {
        let id = Uuid::nil();
        let err = ForgeError::not_found("idea", id);
        assert_eq!(err.to_string(), format!("idea {id} not found"));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_input_is_bad_request() {
        let resp = ForgeError::InvalidInput("title must not be empty".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
