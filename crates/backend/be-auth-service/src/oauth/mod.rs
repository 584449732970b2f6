pub mod github;
pub mod google;
pub mod pkce;

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Code exchange failed: {0}")]
    CodeExchange(String),
    #[error("Failed to fetch user info: {0}")]
    UserInfoFetch(String),
    #[error("Missing email")]
    MissingEmail,
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Identity and credentials returned by a provider after a successful code
/// exchange.
#[derive(Debug, Clone)]
pub struct OAuthUserInfo {
    pub provider_account_id: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

fn build_http_client() -> Result<reqwest::Client, OAuthError> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| OAuthError::HttpClient(e.to_string()))
}

fn url_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

fn env_credentials(prefix: &str) -> Option<(String, String)> {
    let client_id = std::env::var(format!("{prefix}_CLIENT_ID"))
        .ok()
        .filter(|v| !v.trim().is_empty())?;
    let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET"))
        .ok()
        .filter(|v| !v.trim().is_empty())?;
    Some((client_id, client_secret))
}
