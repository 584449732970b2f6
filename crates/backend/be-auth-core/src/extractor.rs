use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;

use crate::{AuthRejection, AuthenticatedUser, SessionAuth};

/// The signed-in user behind a request.
///
/// Use `AuthUser` on routes that require a session and `Option<AuthUser>` on
/// routes where signing in is optional; the latter treats missing, expired
/// and unknown sessions as anonymous.
pub struct AuthUser(pub AuthenticatedUser);

async fn authenticate(parts: &Parts) -> Result<AuthenticatedUser, AuthRejection> {
    let auth = parts
        .extensions
        .get::<SessionAuth>()
        .cloned()
        .ok_or(AuthRejection::Misconfigured)?;

    auth.authenticate(&parts.headers).await
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts).await.map(AuthUser)
    }
}

impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        match authenticate(parts).await {
            Ok(user) => Ok(Some(AuthUser(user))),
            Err(rejection) if rejection.is_anonymous() => Ok(None),
            Err(rejection) => Err(rejection),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::{Extension, Json, Router};
    use chrono::{Duration, Utc};
    use parking_lot::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::{AuthCoreError, SessionConfig, SessionResolver, hash_session_token};

    #[derive(Default)]
    struct MemorySessions {
        sessions: Mutex<HashMap<Vec<u8>, AuthenticatedUser>>,
        fail: bool,
    }

    #[async_trait]
    impl SessionResolver for MemorySessions {
        async fn resolve_session(
            &self,
            token_hash: &[u8],
        ) -> Result<Option<AuthenticatedUser>, AuthCoreError> {
            if self.fail {
                return Err(AuthCoreError::Random("backend down".into()));
            }
            Ok(self.sessions.lock().get(token_hash).cloned())
        }
    }

    fn app(resolver: MemorySessions) -> Router {
        let auth = SessionAuth::new(Arc::new(resolver), Arc::new(SessionConfig::default()));
        Router::new()
            .route(
                "/me",
                get(|AuthUser(user): AuthUser| async move { Json(user.email) }),
            )
            .route(
                "/maybe",
                get(|user: Option<AuthUser>| async move {
                    Json(user.map(|AuthUser(u)| u.email))
                }),
            )
            .layer(Extension(auth))
    }

    fn resolver_with(token: &str) -> MemorySessions {
        let resolver = MemorySessions::default();
        resolver.sessions.lock().insert(
            hash_session_token(token),
            AuthenticatedUser {
                user_id: Uuid::nil(),
                email: "a@b.com".into(),
                name: None,
                image: None,
                session_expires_at: Utc::now() + Duration::days(1),
            },
        );
        resolver
    }

    async fn get_status(app: Router, uri: &str, cookie: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header("cookie", cookie);
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn required_session_rejects_anonymous_requests() {
        let (status, body) = get_status(app(resolver_with("tok")), "/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Not signed in"));
    }

    #[tokio::test]
    async fn required_session_rejects_unknown_token() {
        let (status, _) =
            get_status(app(resolver_with("tok")), "/me", Some("cc_session=nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_cookie_resolves_user() {
        let (status, body) =
            get_status(app(resolver_with("tok")), "/me", Some("cc_session=tok")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "\"a@b.com\"");
    }

    #[tokio::test]
    async fn optional_session_falls_back_to_anonymous() {
        let (status, body) =
            get_status(app(resolver_with("tok")), "/maybe", Some("cc_session=nope")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "null");
    }

    #[tokio::test]
    async fn optional_session_surfaces_backend_failure() {
        let resolver = MemorySessions {
            fail: true,
            ..Default::default()
        };
        let (status, _) = get_status(app(resolver), "/maybe", Some("cc_session=tok")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn missing_extension_is_a_server_error() {
        let app = Router::new().route(
            "/me",
            get(|AuthUser(user): AuthUser| async move { Json(user.email) }),
        );
        let (status, _) = get_status(app, "/me", Some("cc_session=tok")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
