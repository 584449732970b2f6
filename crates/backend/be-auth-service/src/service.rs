use std::sync::Arc;

use be_auth_core::{SessionAuth, SessionConfig, generate_session_token, hash_session_token};
use be_remote_db::{DatabaseManager, DbError, OAuthProvider, User};
use bon::bon;
use chrono::{DateTime, Duration, Utc};

use crate::error::AuthError;
use crate::oauth::github::{GitHubOAuthClient, GitHubOAuthConfig};
use crate::oauth::google::{GoogleOAuthClient, GoogleOAuthConfig};
use crate::oauth::{OAuthUserInfo, pkce};

const OAUTH_STATE_TTL_MINUTES: i64 = 10;
const DEFAULT_LANDING_PATH: &str = "/dashboard";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub frontend_url: String,
    pub github: Option<GitHubOAuthConfig>,
    pub google: Option<GoogleOAuthConfig>,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let frontend_url = std::env::var("FRONTEND_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        Self {
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            github: GitHubOAuthConfig::from_env(),
            google: GoogleOAuthConfig::from_env(),
        }
    }
}

/// Result of a completed sign-in: the raw session token for the cookie and
/// where to send the browser next.
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub session_token: String,
    pub redirect_url: String,
}

pub struct AuthService {
    db: Arc<DatabaseManager>,
    session_config: Arc<SessionConfig>,
    github: Option<GitHubOAuthClient>,
    google: Option<GoogleOAuthClient>,
    frontend_url: String,
}

#[bon]
impl AuthService {
    pub fn new(db: Arc<DatabaseManager>, session_config: Arc<SessionConfig>, config: AuthConfig) -> Self {
        if config.github.is_none() {
            tracing::info!("GitHub OAuth not configured");
        }
        if config.google.is_none() {
            tracing::info!("Google OAuth not configured");
        }

        Self {
            db,
            session_config,
            github: config.github.map(GitHubOAuthClient::new),
            google: config.google.map(GoogleOAuthClient::new),
            frontend_url: config.frontend_url,
        }
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Request extension that lets [`be_auth_core::AuthUser`] resolve
    /// sessions against this service's database.
    pub fn session_auth(&self) -> SessionAuth {
        SessionAuth::new(self.db.clone(), self.session_config.clone())
    }

    fn ensure_configured(&self, provider: OAuthProvider) -> Result<(), AuthError> {
        let configured = match provider {
            OAuthProvider::Github => self.github.is_some(),
            OAuthProvider::Google => self.google.is_some(),
        };
        if configured {
            Ok(())
        } else {
            Err(AuthError::ProviderNotConfigured(provider))
        }
    }

    /// Persists a fresh login state and returns the provider URL the browser
    /// should be sent to.
    pub async fn begin_login(
        &self,
        provider: OAuthProvider,
        redirect_to: Option<String>,
    ) -> Result<String, AuthError> {
        self.ensure_configured(provider)?;

        let redirect_to = redirect_to.filter(|path| is_safe_redirect_path(path));
        let state = pkce::generate_state()?;
        let verifier = pkce::generate_verifier()?;
        let challenge = pkce::challenge_for(&verifier);

        self.db
            .create_oauth_state()
            .state(state.clone())
            .provider(provider)
            .pkce_verifier(verifier)
            .maybe_redirect_to(redirect_to)
            .expires_at(Utc::now() + Duration::minutes(OAUTH_STATE_TTL_MINUTES))
            .call()
            .await?;

        let url = match provider {
            OAuthProvider::Github => self
                .github
                .as_ref()
                .map(|c| c.get_authorization_url(&state, &challenge)),
            OAuthProvider::Google => self
                .google
                .as_ref()
                .map(|c| c.get_authorization_url(&state, &challenge)),
        };

        tracing::debug!(%provider, "Starting OAuth login");
        url.ok_or(AuthError::ProviderNotConfigured(provider))
    }

    pub async fn complete_login(
        &self,
        provider: OAuthProvider,
        code: &str,
        state: &str,
    ) -> Result<LoginOutcome, AuthError> {
        self.ensure_configured(provider)?;

        if state.is_empty() || code.is_empty() {
            return Err(AuthError::InvalidInput(
                "Missing code or state parameter".into(),
            ));
        }

        let oauth_state = match self.db.consume_oauth_state(state).await {
            Ok(row) => row,
            Err(e) if e.is_not_found() => {
                tracing::warn!(%provider, "Invalid or expired OAuth state");
                return Err(AuthError::InvalidState);
            }
            Err(e) => return Err(e.into()),
        };

        if oauth_state.provider != provider {
            tracing::warn!(
                expected = %oauth_state.provider,
                actual = %provider,
                "OAuth state used with a different provider"
            );
            return Err(AuthError::InvalidState);
        }

        let info = match provider {
            OAuthProvider::Github => match &self.github {
                Some(client) => client.exchange_code(code, &oauth_state.pkce_verifier).await?,
                None => return Err(AuthError::ProviderNotConfigured(provider)),
            },
            OAuthProvider::Google => match &self.google {
                Some(client) => client.exchange_code(code, &oauth_state.pkce_verifier).await?,
                None => return Err(AuthError::ProviderNotConfigured(provider)),
            },
        };

        if !info.email_verified {
            tracing::warn!(%provider, "Sign-in rejected: email not verified");
            return Err(AuthError::EmailNotVerified);
        }

        let user = self
            .find_or_create_oauth_user()
            .provider(provider)
            .info(&info)
            .call()
            .await?;

        let session_token = self.create_session(&user).await?;

        let path = oauth_state
            .redirect_to
            .as_deref()
            .filter(|p| is_safe_redirect_path(p))
            .unwrap_or(DEFAULT_LANDING_PATH);

        tracing::info!(user_id = %user.id, %provider, "User signed in");

        Ok(LoginOutcome {
            user,
            session_token,
            redirect_url: format!("{}{}", self.frontend_url, path),
        })
    }

    /// Resolves the local user for a provider identity: by linked account,
    /// then by email, else a new user. Concurrent first sign-ins for the same
    /// identity resolve to the same user.
    #[builder]
    pub async fn find_or_create_oauth_user(
        &self,
        provider: OAuthProvider,
        info: &OAuthUserInfo,
    ) -> Result<User, AuthError> {
        let expires_at = token_expiry(info.expires_in, Utc::now());

        if let Some(user) = self.linked_user(provider, &info.provider_account_id).await? {
            if let Err(e) = self
                .db
                .update_account_tokens()
                .provider(provider)
                .provider_account_id(&info.provider_account_id)
                .access_token(info.access_token.clone())
                .maybe_refresh_token(info.refresh_token.clone())
                .maybe_access_token_expires_at(expires_at)
                .maybe_scope(info.scope.clone())
                .call()
                .await
            {
                tracing::warn!("Failed to update OAuth account tokens: {}", e);
            }
            return Ok(user);
        }

        if let Some(user) = self.link_by_email(provider, info, expires_at).await? {
            return Ok(user);
        }

        let created = self
            .db
            .create_user_with_account()
            .email(info.email.clone())
            .maybe_name(info.name.clone())
            .maybe_image(info.picture.clone())
            .email_verified(info.email_verified)
            .provider(provider)
            .provider_account_id(info.provider_account_id.clone())
            .access_token(info.access_token.clone())
            .maybe_refresh_token(info.refresh_token.clone())
            .maybe_access_token_expires_at(expires_at)
            .maybe_scope(info.scope.clone())
            .call()
            .await;

        match created {
            Ok(user) => {
                tracing::info!(user_id = %user.id, %provider, "Created user from OAuth sign-in");
                Ok(user)
            }
            // A concurrent sign-in won the insert, for this account or this email.
            Err(DbError::Duplicate { .. }) => {
                if let Some(user) = self.linked_user(provider, &info.provider_account_id).await? {
                    return Ok(user);
                }
                self.link_by_email(provider, info, expires_at)
                    .await?
                    .ok_or_else(|| AuthError::Internal("Failed to create user account".into()))
            }
            Err(e) => Err(AuthError::Database(e)),
        }
    }

    async fn link_by_email(
        &self,
        provider: OAuthProvider,
        info: &OAuthUserInfo,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<User>, AuthError> {
        let existing = match self.db.get_user().email(info.email.clone()).call().await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            user_id = %existing.id,
            %provider,
            "Linking provider to existing user via email match"
        );

        let linked = self
            .db
            .create_account()
            .user_id(existing.id)
            .provider(provider)
            .provider_account_id(info.provider_account_id.clone())
            .access_token(info.access_token.clone())
            .maybe_refresh_token(info.refresh_token.clone())
            .maybe_access_token_expires_at(expires_at)
            .maybe_scope(info.scope.clone())
            .call()
            .await;

        match linked {
            Ok(_) => {}
            // A concurrent sign-in linked this provider account first.
            Err(DbError::Duplicate { .. }) => {
                return match self.linked_user(provider, &info.provider_account_id).await? {
                    Some(user) => Ok(Some(user)),
                    None => Err(AuthError::Internal(
                        "Provider account conflict without a linked user".into(),
                    )),
                };
            }
            Err(e) => return Err(e.into()),
        }

        if existing.email_verified_at.is_none() {
            self.db.mark_email_verified(existing.id).await?;
        }

        Ok(Some(existing))
    }

    async fn linked_user(
        &self,
        provider: OAuthProvider,
        provider_account_id: &str,
    ) -> Result<Option<User>, AuthError> {
        Ok(self
            .db
            .get_user_by_account()
            .provider(provider)
            .provider_account_id(provider_account_id)
            .call()
            .await?)
    }

    async fn create_session(&self, user: &User) -> Result<String, AuthError> {
        let token = generate_session_token()?;

        self.db
            .create_session()
            .user_id(user.id)
            .token_hash(hash_session_token(&token))
            .expires_at(self.session_config.expires_at(Utc::now()))
            .call()
            .await?;

        Ok(token)
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let removed = self.db.delete_session(&hash_session_token(token)).await?;
        tracing::debug!(removed, "Signed out");
        Ok(())
    }
}

fn token_expiry(expires_in: Option<i64>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    expires_in
        .filter(|secs| *secs > 0)
        .map(|secs| now + Duration::seconds(secs))
}

/// Only same-site absolute paths are honored as post-login targets.
fn is_safe_redirect_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
