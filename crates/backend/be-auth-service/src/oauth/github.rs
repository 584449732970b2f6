use serde::Deserialize;

use super::{OAuthError, OAuthUserInfo, build_http_client, env_credentials, url_encode};

const USER_AGENT: &str = "commandcore-auth-service";

#[derive(Debug, Clone)]
pub struct GitHubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl GitHubOAuthConfig {
    /// `None` when the client credentials are not set, which disables the
    /// provider.
    pub fn from_env() -> Option<Self> {
        let (client_id, client_secret) = env_credentials("GITHUB")?;
        let redirect_uri = std::env::var("GITHUB_REDIRECT_URI").unwrap_or_else(|_| {
            "http://localhost:8000/api/auth/github/callback".to_string()
        });

        Some(Self {
            client_id,
            client_secret,
            redirect_uri,
        })
    }
}

#[derive(Deserialize)]
struct GitHubTokenResponse {
    access_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubApiUser {
    id: i64,
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubApiEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GitHubOAuthClient {
    config: GitHubOAuthConfig,
}

impl GitHubOAuthClient {
    pub fn new(config: GitHubOAuthConfig) -> Self {
        Self { config }
    }

    pub fn get_authorization_url(&self, state: &str, pkce_challenge: &str) -> String {
        format!(
            "https://github.com/login/oauth/authorize?client_id={}&redirect_uri={}&state={}&scope=read:user%20user:email&code_challenge={}&code_challenge_method=S256",
            url_encode(&self.config.client_id),
            url_encode(&self.config.redirect_uri),
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

        let token_resp: GitHubTokenResponse = http_client
            .post("https://github.com/login/oauth/access_token")
            .header("Accept", "application/json")
            .form(&[
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

        if let Some(error) = &token_resp.error {
            let desc = token_resp.error_description.as_deref().unwrap_or(error);
            return Err(OAuthError::CodeExchange(desc.to_string()));
        }

        let access_token = token_resp
            .access_token
            .ok_or_else(|| OAuthError::CodeExchange("Missing access_token in response".into()))?;

        let user: GitHubApiUser = http_client
            .get("https://api.github.com/user")
            .bearer_auth(&access_token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| OAuthError::UserInfoFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| OAuthError::UserInfoFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::UserInfoFetch(e.to_string()))?;

        let emails: Vec<GitHubApiEmail> = http_client
            .get("https://api.github.com/user/emails")
            .bearer_auth(&access_token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| OAuthError::UserInfoFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| OAuthError::UserInfoFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::UserInfoFetch(e.to_string()))?;

        let primary_email = pick_email(&emails).ok_or(OAuthError::MissingEmail)?;

        Ok(OAuthUserInfo {
            provider_account_id: user.id.to_string(),
            email: primary_email.email.clone(),
            email_verified: primary_email.verified,
            name: user.name.or(Some(user.login)),
            picture: user.avatar_url,
            access_token,
            refresh_token: None,
            expires_in: None,
            scope: token_resp.scope,
        })
    }
}

fn pick_email(emails: &[GitHubApiEmail]) -> Option<&GitHubApiEmail> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GitHubOAuthClient {
        GitHubOAuthClient::new(GitHubOAuthConfig {
            client_id: "gh-client".into(),
            client_secret: "gh-secret".into(),
            redirect_uri: "http://localhost:8000/api/auth/github/callback".into(),
        })
    }

    #[test]
    fn authorization_url_carries_state_and_challenge() {
        let url = client().get_authorization_url("st4te", "ch4llenge");
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("client_id=gh%2Dclient"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("code_challenge=ch4llenge"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fapi%2Fauth%2Fgithub%2Fcallback"));
    }

    #[test]
    fn primary_verified_email_wins() {
        let emails = vec![
            GitHubApiEmail {
                email: "old@example.com".into(),
                primary: false,
                verified: true,
            },
            GitHubApiEmail {
                email: "main@example.com".into(),
                primary: true,
                verified: true,
            },
        ];
        assert_eq!(pick_email(&emails).unwrap().email, "main@example.com");
    }

    #[test]
    fn unverified_emails_are_never_picked() {
        let emails = vec![GitHubApiEmail {
            email: "main@example.com".into(),
            primary: true,
            verified: false,
        }];
        assert!(pick_email(&emails).is_none());
    }
}
