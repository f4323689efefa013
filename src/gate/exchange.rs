//! Authorization code exchange against the provider's token endpoint

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

/// Tokens returned by a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenSet {
    /// ID token
    pub id_token: String,
    /// Access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
}

/// Parameters of one code exchange.
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    /// OAuth client id
    pub client_id: &'a str,
    /// OAuth client secret
    pub client_secret: &'a str,
    /// Authorization code from the callback
    pub code: &'a str,
    /// Redirect URI used at login, `https://{host}/auth/callback`
    pub redirect_uri: &'a str,
}

/// Exchange failures. Display strings are short and safe to show users.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The client secret could not be obtained
    #[error("client credentials unavailable")]
    Credentials,

    /// Network failure or timeout
    #[error("token endpoint unreachable")]
    Transport(#[source] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("token endpoint returned HTTP {0}")]
    Status(u16),

    /// The body was not a token set
    #[error("malformed token response")]
    MalformedResponse,
}

/// The provider's token endpoint.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for tokens.
    async fn exchange(&self, request: CodeExchange<'_>) -> Result<TokenSet, ExchangeError>;
}

/// `POST https://{auth_domain}/oauth2/token` with HTTP Basic client auth.
pub struct HttpTokenEndpoint {
    http: reqwest::Client,
    url: String,
}

impl HttpTokenEndpoint {
    /// Create an endpoint client for `auth_domain`.
    #[must_use]
    pub fn new(http: reqwest::Client, auth_domain: &str) -> Self {
        Self::with_url(http, token_endpoint_url(auth_domain))
    }

    /// Create an endpoint client posting to a full token endpoint URL.
    #[must_use]
    pub fn with_url(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

/// Token endpoint URL for a hosted auth domain.
#[must_use]
pub fn token_endpoint_url(auth_domain: &str) -> String {
    format!("https://{auth_domain}/oauth2/token")
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange(&self, request: CodeExchange<'_>) -> Result<TokenSet, ExchangeError> {
        debug!(endpoint = %self.url, redirect_uri = %request.redirect_uri, "Exchanging code for tokens");

        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", request.client_id),
            ("client_secret", request.client_secret),
            ("code", request.code),
            ("redirect_uri", request.redirect_uri),
        ];

        let response = self
            .http
            .post(&self.url)
            .basic_auth(request.client_id, Some(request.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Token request failed");
                ExchangeError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Token exchange rejected");
            return Err(ExchangeError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(ExchangeError::Transport)?;
        serde_json::from_slice::<TokenSet>(&body).map_err(|e| {
            error!(error = %e, "Failed to parse token response");
            ExchangeError::MalformedResponse
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_endpoint_url_for_domain() {
        assert_eq!(
            token_endpoint_url("auth.example.com"),
            "https://auth.example.com/oauth2/token"
        );
    }

    #[test]
    fn token_set_ignores_extra_fields() {
        let body = r#"{"id_token":"a","access_token":"b","refresh_token":"c","expires_in":3600,"token_type":"Bearer"}"#;
        let tokens: TokenSet = serde_json::from_str(body).unwrap();
        assert_eq!(tokens.refresh_token, "c");
    }

    #[test]
    fn token_set_requires_all_tokens() {
        let body = r#"{"id_token":"a","access_token":"b"}"#;
        assert!(serde_json::from_str::<TokenSet>(body).is_err());
    }

    #[test]
    fn error_messages_are_generic() {
        assert_eq!(
            ExchangeError::Status(400).to_string(),
            "token endpoint returned HTTP 400"
        );
        assert_eq!(
            ExchangeError::MalformedResponse.to_string(),
            "malformed token response"
        );
    }
}
