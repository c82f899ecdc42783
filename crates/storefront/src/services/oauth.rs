//! Third-party sign-in.
//!
//! The authorization-code flow has two legs:
//!
//! 1. Redirect the browser to [`IdentityProvider::authorization_url`] with a
//!    random `state` remembered in a short-lived cookie
//! 2. On callback, compare `state` and call [`IdentityProvider::exchange_code`]
//!
//! The provider only vouches for an identity; account matching and token
//! issuance happen in the auth service.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::GoogleOAuthConfig;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Errors from the identity provider round trip.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("{stage} failed: {status} - {message}")]
    Provider {
        stage: &'static str,
        status: u16,
        message: String,
    },

    /// A configured endpoint is not a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Provider response lacked a usable subject.
    #[error("provider returned no account id")]
    MissingSubject,
}

/// The identity an external provider vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Stable subject id at the provider.
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// An OAuth authorization-code identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent page URL carrying `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization code for the signed-in identity.
    ///
    /// # Errors
    ///
    /// Returns `OAuthError` if either provider call fails.
    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity, OAuthError>;
}

/// Build the configured provider, if Google sign-in is enabled.
///
/// # Errors
///
/// Returns `OAuthError` if the provider client cannot be built.
pub fn from_config(
    config: Option<&GoogleOAuthConfig>,
) -> Result<Option<Arc<dyn IdentityProvider>>, OAuthError> {
    config
        .map(|c| GoogleIdentityProvider::new(c).map(|p| Arc::new(p) as Arc<dyn IdentityProvider>))
        .transpose()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

impl GoogleUserInfo {
    fn into_identity(self) -> Result<ExternalIdentity, OAuthError> {
        let external_id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or(OAuthError::MissingSubject)?;

        Ok(ExternalIdentity {
            external_id,
            email: self.email.filter(|e| !e.is_empty()),
            display_name: self.name.filter(|n| !n.is_empty()),
        })
    }
}

/// Google OAuth 2.0 sign-in.
#[derive(Clone)]
pub struct GoogleIdentityProvider {
    client: reqwest::Client,
    auth_url: Url,
    client_id: String,
    client_secret: SecretString,
    redirect_url: String,
}

impl GoogleIdentityProvider {
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &GoogleOAuthConfig) -> Result<Self, OAuthError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            auth_url: Url::parse(GOOGLE_AUTH_URL)?,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
        })
    }

    async fn fetch_access_token(&self, code: &str) -> Result<String, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
        ];

        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OAuthError::Provider {
                stage: "token exchange",
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("access_type", "online")
            .append_pair("state", state);
        url.into()
    }

    #[tracing::instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity, OAuthError> {
        let access_token = self.fetch_access_token(code).await?;

        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OAuthError::Provider {
                stage: "userinfo",
                status: status.as_u16(),
                message,
            });
        }

        let info: GoogleUserInfo = response.json().await?;
        info.into_identity()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn provider() -> GoogleIdentityProvider {
        GoogleIdentityProvider::new(&GoogleOAuthConfig {
            client_id: "client-123.apps.googleusercontent.com".to_string(),
            client_secret: SecretString::from("s3cr3t"),
            redirect_url: "https://api.ryangel.test/api/auth/google/callback".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_authorization_url_carries_state_and_redirect() {
        let url = Url::parse(&provider().authorization_url("abc 123")).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("state").map(String::as_str), Some("abc 123"));
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(
            pairs.get("redirect_uri").map(String::as_str),
            Some("https://api.ryangel.test/api/auth/google/callback")
        );
    }

    #[test]
    fn test_userinfo_without_id_is_rejected() {
        let info: GoogleUserInfo =
            serde_json::from_str(r#"{"email":"a@b.com","name":"A"}"#).unwrap();
        assert!(matches!(
            info.into_identity(),
            Err(OAuthError::MissingSubject)
        ));
    }

    #[test]
    fn test_userinfo_blank_fields_become_none() {
        let info: GoogleUserInfo =
            serde_json::from_str(r#"{"id":"10987","email":"","name":"Mei"}"#).unwrap();
        let identity = info.into_identity().unwrap();
        assert_eq!(identity.external_id, "10987");
        assert_eq!(identity.email, None);
        assert_eq!(identity.display_name.as_deref(), Some("Mei"));
    }
}
