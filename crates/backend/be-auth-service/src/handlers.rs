use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Redirect;
use axum_extra::extract::cookie::CookieJar;
use be_auth_core::{AuthUser, AuthenticatedUser};
use be_remote_db::OAuthProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::service::AuthService;

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: AuthenticatedUser,
    pub expires_at: DateTime<Utc>,
}

fn parse_provider(raw: &str) -> Result<OAuthProvider, AuthError> {
    raw.parse()
        .map_err(|_| AuthError::UnknownProvider(raw.to_string()))
}

// ---------------------------------------------------------------------------
// GET /api/auth/{provider}/authorize
// ---------------------------------------------------------------------------

pub async fn authorize(
    State(service): State<Arc<AuthService>>,
    Path(provider): Path<String>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, AuthError> {
    let provider = parse_provider(&provider)?;
    let url = service.begin_login(provider, params.redirect).await?;
    Ok(Redirect::to(&url))
}

// ---------------------------------------------------------------------------
// GET /api/auth/{provider}/callback
// ---------------------------------------------------------------------------

pub async fn callback(
    State(service): State<Arc<AuthService>>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthError> {
    let provider = parse_provider(&provider)?;

    if let Some(error) = params.error {
        tracing::info!(%provider, %error, "Provider returned an authorization error");
        return Err(AuthError::InvalidInput(format!(
            "Authorization was not granted: {error}"
        )));
    }

    let code = params.code.unwrap_or_default();
    let state = params.state.unwrap_or_default();

    let outcome = service.complete_login(provider, &code, &state).await?;
    let cookie = service
        .session_config()
        .session_cookie(outcome.session_token);

    Ok((jar.add(cookie), Redirect::to(&outcome.redirect_url)))
}

// ---------------------------------------------------------------------------
// GET /api/auth/session
// ---------------------------------------------------------------------------

pub async fn get_session(AuthUser(user): AuthUser) -> Json<SessionResponse> {
    let expires_at = user.session_expires_at;
    Json(SessionResponse { user, expires_at })
}

// ---------------------------------------------------------------------------
// POST /api/auth/sign-out
// ---------------------------------------------------------------------------

pub async fn sign_out(
    State(service): State<Arc<AuthService>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AuthError> {
    if let Some(token) = service.session_config().token_from_headers(&headers) {
        service.sign_out(&token).await?;
    }

    let jar = service.session_config().clear_session_cookie(jar);
    Ok((jar, StatusCode::NO_CONTENT))
}
