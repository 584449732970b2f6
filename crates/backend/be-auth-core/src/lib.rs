//! Session primitives shared by every HTTP service: how session tokens are
//! minted and hashed, how the session cookie looks, and the [`AuthUser`]
//! extractor that resolves a request to a signed-in user.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use be_remote_db::{DatabaseManager, SessionWithUser};
use chrono::{DateTime, Duration, Utc};
use rand::TryRngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

mod error;
mod extractor;

pub use error::{AuthCoreError, AuthRejection};
pub use extractor::AuthUser;

const SESSION_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl: Duration,
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "cc_session".to_string(),
            ttl: Duration::days(30),
            secure_cookie: true,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cookie_name = std::env::var("SESSION_COOKIE_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.cookie_name);

        let ttl = std::env::var("SESSION_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|days| *days > 0)
            .map(Duration::days)
            .unwrap_or(defaults.ttl);

        let secure_cookie = std::env::var("SESSION_COOKIE_SECURE")
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(defaults.secure_cookie);

        Self {
            cookie_name,
            ttl,
            secure_cookie,
        }
    }

    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.ttl
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .max_age(time::Duration::seconds(self.ttl.num_seconds()))
            .build()
    }

    /// Always emits an expiring `Set-Cookie`, whether or not the request
    /// carried the cookie.
    pub fn clear_session_cookie(&self, jar: CookieJar) -> CookieJar {
        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .build();
        cookie.make_removal();
        jar.add(cookie)
    }

    /// Session token carried by the request: a bearer token wins over the
    /// session cookie.
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let bearer = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if let Some(token) = bearer {
            return Some(token.to_string());
        }

        CookieJar::from_headers(headers)
            .get(&self.cookie_name)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    }
}

pub fn generate_session_token() -> Result<String, AuthCoreError> {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthCoreError::Random(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// Only this hash is persisted; the raw token never reaches the database.
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub session_expires_at: DateTime<Utc>,
}

impl From<SessionWithUser> for AuthenticatedUser {
    fn from(row: SessionWithUser) -> Self {
        Self {
            user_id: row.session.user_id,
            email: row.user.email,
            name: row.user.name,
            image: row.user.image,
            session_expires_at: row.session.expires_at,
        }
    }
}

/// Looks up the user behind a hashed session token. Expired sessions resolve
/// to `None`.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve_session(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<AuthenticatedUser>, AuthCoreError>;
}

#[async_trait]
impl SessionResolver for DatabaseManager {
    async fn resolve_session(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<AuthenticatedUser>, AuthCoreError> {
        let Some(row) = self.get_session_with_user(token_hash).await? else {
            return Ok(None);
        };

        if row.session.is_expired_at(Utc::now()) {
            tracing::debug!(session_id = %row.session.id, "Dropping expired session");
            if let Err(e) = self.delete_session(token_hash).await {
                tracing::warn!(error = %e, "Failed to delete expired session");
            }
            return Ok(None);
        }

        Ok(Some(row.into()))
    }
}

/// Request extension consumed by [`AuthUser`]. Routers that authenticate
/// requests install it with `axum::Extension`.
#[derive(Clone)]
pub struct SessionAuth {
    pub resolver: Arc<dyn SessionResolver>,
    pub config: Arc<SessionConfig>,
}

impl SessionAuth {
    pub fn new(resolver: Arc<dyn SessionResolver>, config: Arc<SessionConfig>) -> Self {
        Self { resolver, config }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthRejection> {
        let token = self
            .config
            .token_from_headers(headers)
            .ok_or(AuthRejection::MissingSession)?;

        self.resolver
            .resolve_session(&hash_session_token(&token))
            .await
            .map_err(AuthRejection::Backend)?
            .ok_or(AuthRejection::InvalidSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_tokens_are_unique_hex() {
        let a = generate_session_token().unwrap();
        let b = generate_session_token().unwrap();
        assert_eq!(a.len(), SESSION_TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn token_hash_is_stable_sha256() {
        let hash = hash_session_token("abc");
        assert_eq!(hash.len(), 32);
        assert_eq!(
            hex::encode(&hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash, hash_session_token("abd"));
    }

    #[test]
    fn bearer_token_takes_precedence_over_cookie() {
        let config = SessionConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("cc_session=from-cookie"));
        assert_eq!(
            config.token_from_headers(&headers).as_deref(),
            Some("from-cookie")
        );

        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            config.token_from_headers(&headers).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn empty_or_foreign_credentials_are_ignored() {
        let config = SessionConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        headers.insert("cookie", HeaderValue::from_static("other=1; cc_session="));
        assert_eq!(config.token_from_headers(&headers), None);
    }

    #[test]
    fn session_cookie_is_http_only_and_lax() {
        let config = SessionConfig {
            secure_cookie: false,
            ..SessionConfig::default()
        };
        let cookie = config.session_cookie("tok".to_string());
        assert_eq!(cookie.name(), "cc_session");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(
            cookie.max_age(),
            Some(time::Duration::seconds(30 * 24 * 3600))
        );
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let config = SessionConfig::default();
        let jar = config.clear_session_cookie(CookieJar::new());
        let cookie = jar.get("cc_session").unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn expiry_follows_ttl() {
        let config = SessionConfig {
            ttl: Duration::days(2),
            ..SessionConfig::default()
        };
        let now = Utc::now();
        assert_eq!(config.expires_at(now) - now, Duration::days(2));
    }
}
