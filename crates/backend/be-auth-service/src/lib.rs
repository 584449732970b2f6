use std::sync::Arc;

use anyhow::Result;
use axum::{
    Extension, Router,
    routing::{get, post},
};
use be_auth_core::SessionConfig;
use be_remote_db::DatabaseManager;
use tower_http::trace::TraceLayer;
use tracing::debug;

pub mod error;
pub mod handlers;
pub mod oauth;
pub mod service;

pub use error::AuthError;
pub use service::{AuthConfig, AuthService, LoginOutcome};

pub fn create_router(service: Arc<AuthService>) -> Router {
    let session_auth = service.session_auth();

    Router::new()
        .route("/api/auth/{provider}/authorize", get(handlers::authorize))
        .route("/api/auth/{provider}/callback", get(handlers::callback))
        .route("/api/auth/session", get(handlers::get_session))
        .route("/api/auth/sign-out", post(handlers::sign_out))
        .layer(Extension(session_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

pub fn init_auth_service(
    db: Arc<DatabaseManager>,
    session_config: Arc<SessionConfig>,
) -> Result<Router> {
    debug!("Initializing auth service");

    let service = Arc::new(AuthService::new(db, session_config, AuthConfig::from_env()));

    Ok(create_router(service))
}
