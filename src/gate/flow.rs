//! Routes under `/auth/`: login, callback, logout and the error page
//!
//! | Path             | Response                                             |
//! |------------------|------------------------------------------------------|
//! | `/auth/callback` | exchange `code`, set session cookies, 302 to `state` |
//! | `/auth/logout`   | expire session cookies, 302 to provider logout       |
//! | `/auth/error`    | 200 static HTML                                      |
//! | `/auth/login`    | 302 to provider login, returning to `/`              |
//! | anything else    | not handled here                                     |

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::{Url, form_urlencoded};

use super::cookies::{self, ACCESS_TOKEN, ID_TOKEN, REFRESH_TOKEN, SESSION_COOKIES};
use super::exchange::{CodeExchange, ExchangeError, TokenEndpoint, TokenSet};
use super::request::{EdgeRequest, EdgeResponse};
use super::state::{self, DEFAULT_DESTINATION};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::secrets::SecretCache;
use crate::token::codec;
use crate::{Error, Result};

/// Prefix of every auth route
pub const AUTH_PREFIX: &str = "/auth/";
/// OAuth redirect target
pub const CALLBACK_PATH: &str = "/auth/callback";
/// Session termination
pub const LOGOUT_PATH: &str = "/auth/logout";
/// Static error page
pub const ERROR_PATH: &str = "/auth/error";
/// Explicit login entry point
pub const LOGIN_PATH: &str = "/auth/login";

/// Lifetime given to a refresh token whose expiry cannot be read.
pub const DEFAULT_REFRESH_LIFETIME_SECS: i64 = 3600;

const ERROR_PAGE: &str = "<html><body><h1>Authentication Error</h1>\
<p>Please try again or contact support.</p></body></html>";

const MISSING_HOST: &str = "missing Host header";

/// Browser-facing identity provider URLs.
#[derive(Debug, Clone)]
pub struct ProviderUrls {
    login: Url,
    logout: Url,
    client_id: String,
    scope: String,
}

impl ProviderUrls {
    /// Build from the auth configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the auth domain does not form a valid URL.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let base = |path: &str| {
            Url::parse(&format!("https://{}/{path}", config.auth_domain))
                .map_err(|e| Error::Config(format!("Invalid auth_domain: {e}")))
        };
        Ok(Self {
            login: base("login")?,
            logout: base("logout")?,
            client_id: config.client_id.clone(),
            scope: config.scope.clone(),
        })
    }

    /// Redirect URI registered with the provider for `host`.
    #[must_use]
    pub fn redirect_uri(host: &str) -> String {
        format!("https://{host}{CALLBACK_PATH}")
    }

    /// Login/authorize URL carrying `state`.
    #[must_use]
    pub fn login_url(&self, host: &str, state: &str) -> String {
        let mut url = self.login.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scope)
            .append_pair("state", state)
            .append_pair("redirect_uri", &Self::redirect_uri(host));
        url.into()
    }

    /// Logout URL returning the browser to the root of `host`.
    #[must_use]
    pub fn logout_url(&self, host: &str) -> String {
        let mut url = self.logout.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("logout_uri", &format!("https://{host}"));
        url.into()
    }
}

/// Redirect to the error page carrying a short message.
#[must_use]
pub fn error_redirect(message: &str) -> EdgeResponse {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("message", message)
        .finish();
    EdgeResponse::redirect(&format!("{ERROR_PATH}?{query}"))
}

/// The `/auth/*` state machine.
pub struct AuthFlow {
    urls: ProviderUrls,
    client_id: String,
    secret_name: String,
    secrets: Arc<SecretCache>,
    tokens: Arc<dyn TokenEndpoint>,
    clock: Arc<dyn Clock>,
}

impl AuthFlow {
    /// Create the flow.
    #[must_use]
    pub fn new(
        urls: ProviderUrls,
        client_id: &str,
        secret_name: &str,
        secrets: Arc<SecretCache>,
        tokens: Arc<dyn TokenEndpoint>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            urls,
            client_id: client_id.to_string(),
            secret_name: secret_name.to_string(),
            secrets,
            tokens,
            clock,
        }
    }

    /// Provider URLs used by this flow.
    #[must_use]
    pub fn urls(&self) -> &ProviderUrls {
        &self.urls
    }

    /// Handle an auth route; `None` when the path is not one of ours.
    pub async fn handle(&self, request: &EdgeRequest) -> Option<EdgeResponse> {
        let response = match request.path.as_str() {
            CALLBACK_PATH => self.callback(request).await,
            LOGOUT_PATH => self.logout(request),
            ERROR_PATH => {
                debug!("Displaying error page");
                EdgeResponse::html(ERROR_PAGE)
            }
            LOGIN_PATH => self.login(request),
            _ => return None,
        };
        Some(response)
    }

    async fn callback(&self, request: &EdgeRequest) -> EdgeResponse {
        let Some(host) = request.host() else {
            return EdgeResponse::bad_request(MISSING_HOST);
        };

        if let Some(error) = request.query_param("error") {
            warn!(error = %error, "Identity provider reported an error");
            return error_redirect(&error);
        }

        let Some(code) = request.query_param("code") else {
            warn!("Callback without authorization code");
            return error_redirect("missing authorization code");
        };

        let tokens = match self.exchange(&code, host).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Token exchange failed");
                return error_redirect(&e.to_string());
            }
        };

        let destination = state::destination_from_state(request.query_param("state").as_deref());
        info!(destination = %destination, "Login completed");

        let now = self.clock.now();
        let refresh_exp = codec::parse_expiry(&tokens.refresh_token)
            .unwrap_or(now + DEFAULT_REFRESH_LIFETIME_SECS);

        EdgeResponse::redirect(&destination)
            .with_cookie(&cookies::make_cookie(
                ID_TOKEN,
                &tokens.id_token,
                codec::parse_expiry(&tokens.id_token),
                "/",
            ))
            .with_cookie(&cookies::make_cookie(
                ACCESS_TOKEN,
                &tokens.access_token,
                codec::parse_expiry(&tokens.access_token),
                "/",
            ))
            .with_cookie(&cookies::make_cookie(
                REFRESH_TOKEN,
                &tokens.refresh_token,
                Some(refresh_exp),
                "/",
            ))
    }

    async fn exchange(&self, code: &str, host: &str) -> std::result::Result<TokenSet, ExchangeError> {
        let client_secret = self.secrets.get(&self.secret_name).await.map_err(|e| {
            warn!(error = %e, "Client secret unavailable");
            ExchangeError::Credentials
        })?;
        let redirect_uri = ProviderUrls::redirect_uri(host);

        self.tokens
            .exchange(CodeExchange {
                client_id: &self.client_id,
                client_secret: &client_secret,
                code,
                redirect_uri: &redirect_uri,
            })
            .await
    }

    fn logout(&self, request: &EdgeRequest) -> EdgeResponse {
        let Some(host) = request.host() else {
            return EdgeResponse::bad_request(MISSING_HOST);
        };
        debug!("Processing logout");

        SESSION_COOKIES.iter().fold(
            EdgeResponse::redirect(&self.urls.logout_url(host)),
            |response, name| response.with_cookie(&cookies::expire_cookie(name, "/")),
        )
    }

    fn login(&self, request: &EdgeRequest) -> EdgeResponse {
        let Some(host) = request.host() else {
            return EdgeResponse::bad_request(MISSING_HOST);
        };
        EdgeResponse::redirect(
            &self
                .urls
                .login_url(host, &state::encode_state(DEFAULT_DESTINATION)),
        )
    }
}
