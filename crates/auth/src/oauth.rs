//! Google OAuth client for sign-in with Google.
//!
//! Covers the three provider calls the auth flow needs: authorization
//! URL construction, code exchange, and access-token refresh, plus the
//! userinfo profile fetch that follows an exchange.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GoogleOAuthConfig;

/// Google authorization endpoint.
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google token endpoint (exchange and refresh).
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google userinfo endpoint.
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Scopes requested during sign-in.
const SCOPES: &str = "openid email profile";

/// Errors that can occur when talking to Google.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Google returned an error response.
    #[error("Google API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a Google response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Token response from Google's token endpoint.
///
/// `refresh_token` is only present on the initial code exchange when the
/// user granted offline access, never on a refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleToken {
    /// Bearer token for Google APIs.
    pub access_token: String,
    /// Rotation credential, initial exchange only.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Subset of the userinfo profile the auth flow consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    /// Google's stable account identifier.
    pub id: String,
    /// Verified email address.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Google OAuth capability, object-safe so tests can script responses.
#[async_trait]
pub trait GoogleClient: Send + Sync {
    /// Build the authorization URL carrying the given CSRF state.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<GoogleToken, OAuthError>;

    /// Refresh a Google access token.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<GoogleToken, OAuthError>;

    /// Fetch the signed-in user's profile.
    async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, OAuthError>;
}

/// Generate a cryptographically secure random state string.
#[must_use]
pub fn generate_state() -> String {
    use rand::Rng;
    use rand::distr::Alphanumeric;
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// HTTP client against the real Google endpoints.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    client: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleOAuthClient {
    /// Create a new Google OAuth client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: GoogleOAuthConfig) -> Result<Self, OAuthError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<GoogleToken, OAuthError> {
        let response = self.client.post(TOKEN_URL).form(params).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OAuthError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::Parse(e.to_string()))
    }
}

#[async_trait]
impl GoogleClient for GoogleOAuthClient {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<GoogleToken, OAuthError> {
        self.post_token(&[
            ("client_id", &self.config.client_id),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", &self.config.redirect_uri),
        ])
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<GoogleToken, OAuthError> {
        self.post_token(&[
            ("client_id", &self.config.client_id),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, OAuthError> {
        let response = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OAuthError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::Parse(e.to_string()))
    }
}

impl std::fmt::Debug for GoogleOAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOAuthClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn test_client() -> GoogleOAuthClient {
        GoogleOAuthClient::new(GoogleOAuthConfig {
            client_id: "client-id.apps.googleusercontent.com".to_string(),
            client_secret: SecretString::from("client-secret-value"),
            redirect_uri: "https://shop.example.com/auth/google/callback".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_authorization_url_carries_state() {
        let url = test_client().authorization_url("abc123XYZ");

        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("state=abc123XYZ"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fshop.example.com%2Fauth%2Fgoogle%2Fcallback"
        ));
    }

    #[test]
    fn test_state_is_alphanumeric_and_sized() {
        let state = generate_state();
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(char::is_alphanumeric));
        assert_ne!(state, generate_state());
    }

    #[test]
    fn test_token_response_without_refresh_token() {
        let token: GoogleToken =
            serde_json::from_str(r#"{"access_token":"ya29.abc","expires_in":3599}"#).unwrap();
        assert_eq!(token.access_token, "ya29.abc");
        assert!(token.refresh_token.is_none());
    }
}
