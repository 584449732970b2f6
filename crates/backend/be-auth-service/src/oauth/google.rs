use serde::Deserialize;

use super::{OAuthError, OAuthUserInfo, build_http_client, env_credentials, url_encode};

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl GoogleOAuthConfig {
    pub fn from_env() -> Option<Self> {
        let (client_id, client_secret) = env_credentials("GOOGLE")?;
        let redirect_uri = std::env::var("GOOGLE_REDIRECT_URI").unwrap_or_else(|_| {
            "http://localhost:8000/api/auth/google/callback".to_string()
        });

        Some(Self {
            client_id,
            client_secret,
            redirect_uri,
        })
    }
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

pub struct GoogleOAuthClient {
    config: GoogleOAuthConfig,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self { config }
    }

    pub fn get_authorization_url(&self, state: &str, pkce_challenge: &str) -> String {
        format!(
            "{AUTHORIZATION_ENDPOINT}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256&access_type=offline&prompt=consent",
            url_encode(&self.config.client_id),
            url_encode(&self.config.redirect_uri),
            url_encode("openid email profile"),
            url_encode(state),
            url_encode(pkce_challenge),
        )
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<OAuthUserInfo, OAuthError> {
        let http_client = build_http_client()?;

        let token_resp: GoogleTokenResponse = http_client
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_verifier", pkce_verifier),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::CodeExchange(e.to_string()))?
            .error_for_status()
            .map_err(|e| OAuthError::CodeExchange(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::CodeExchange(e.to_string()))?;

        let user: GoogleUserInfo = http_client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token_resp.access_token)
            .send()
            .await
            .map_err(|e| OAuthError::UserInfoFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| OAuthError::UserInfoFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::UserInfoFetch(e.to_string()))?;

        let email = user.email.ok_or(OAuthError::MissingEmail)?;

        Ok(OAuthUserInfo {
            provider_account_id: user.sub,
            email,
            email_verified: user.email_verified,
            name: user.name,
            picture: user.picture,
            access_token: token_resp.access_token,
            refresh_token: token_resp.refresh_token,
            expires_in: token_resp.expires_in,
            scope: token_resp.scope,
        })
    }
}
