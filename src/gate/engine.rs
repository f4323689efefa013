//! Per-request dispatcher
//!
//! 1. `/auth/*` paths go to [`AuthFlow`]; a handled route ends the request.
//! 2. Protected paths need an `id_token` cookie that passes validation,
//!    otherwise the browser is sent to login with the path as `state`.
//! 3. Everything else passes through untouched.

use std::sync::Arc;

use tracing::{debug, info};

use super::cookies::{self, ID_TOKEN};
use super::exchange::{HttpTokenEndpoint, TokenEndpoint};
use super::flow::{AUTH_PREFIX, AuthFlow, ProviderUrls};
use super::policy::ProtectedPaths;
use super::request::{EdgeRequest, EdgeResponse, GateDecision};
use super::state;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::secrets::{self, SecretCache};
use crate::token::{CachingKeySetFetcher, HttpKeySetFetcher, KeySetFetcher, TokenValidator};
use crate::{Error, Result};

/// External collaborators, injectable for tests.
#[derive(Clone)]
pub struct Collaborators {
    /// Client secret cache
    pub secrets: Arc<SecretCache>,
    /// Provider key-set source
    pub keys: Arc<dyn KeySetFetcher>,
    /// Provider token endpoint
    pub tokens: Arc<dyn TokenEndpoint>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Production wiring: HTTP clients for the provider and the configured secret store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.auth.http_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Ok(Self {
            secrets: Arc::new(SecretCache::new(
                secrets::store_from_config(&config.secrets),
                Arc::clone(&clock),
                config.secrets.ttl,
            )),
            keys: Arc::new(CachingKeySetFetcher::new(
                HttpKeySetFetcher::new(http.clone(), &config.auth.issuer),
                config.auth.jwks_cache_ttl,
            )),
            tokens: Arc::new(HttpTokenEndpoint::new(http, &config.auth.auth_domain)),
            clock,
        })
    }
}

/// The authentication gate.
pub struct RequestGate {
    flow: AuthFlow,
    paths: ProtectedPaths,
    validator: TokenValidator,
    secrets: Arc<SecretCache>,
    secret_name: String,
}

impl RequestGate {
    /// Assemble the gate from configuration and collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the provider URLs cannot be built.
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            secrets,
            keys,
            tokens,
            clock,
        } = collaborators;

        let flow = AuthFlow::new(
            ProviderUrls::new(&config.auth)?,
            &config.auth.client_id,
            &config.secrets.client_secret_name,
            Arc::clone(&secrets),
            tokens,
            Arc::clone(&clock),
        );
        let validator = TokenValidator::new((&config.auth).into(), keys, clock);

        info!(
            patterns = config.auth.protected_paths.len(),
            "Request gate ready"
        );

        Ok(Self {
            flow,
            paths: ProtectedPaths::new(config.auth.protected_paths.clone()),
            validator,
            secrets,
            secret_name: config.secrets.client_secret_name.clone(),
        })
    }

    /// Production gate built from configuration alone.
    ///
    /// # Errors
    ///
    /// See [`Collaborators::from_config`] and [`RequestGate::new`].
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config, Collaborators::from_config(config)?)
    }

    /// Warm the client secret cache; failures are logged only.
    pub async fn prefetch_secret(&self) {
        self.secrets.prefetch(&self.secret_name).await;
    }

    /// Protected path patterns.
    #[must_use]
    pub fn protected_paths(&self) -> &ProtectedPaths {
        &self.paths
    }

    /// Decide what happens to one request.
    pub async fn handle(&self, request: EdgeRequest) -> GateDecision {
        if request.path.starts_with(AUTH_PREFIX) {
            if let Some(response) = self.flow.handle(&request).await {
                return GateDecision::Respond(response);
            }
            debug!(path = %request.path, "Unhandled auth route");
        }

        let Some(pattern) = self.paths.matching_pattern(&request.path) else {
            return GateDecision::PassThrough(request);
        };
        debug!(path = %request.path, pattern = %pattern, "Protected path");

        let cookies = cookies::parse_cookies(request.cookie_headers());
        let authenticated = match cookies.get(ID_TOKEN) {
            Some(token) => self.validator.is_valid(token).await,
            None => {
                debug!(path = %request.path, "No session cookie");
                false
            }
        };

        if authenticated {
            return GateDecision::PassThrough(request);
        }

        // the callback URI is built from the Host header
        let Some(host) = request.host() else {
            return GateDecision::Respond(EdgeResponse::bad_request("missing Host header"));
        };
        info!(path = %request.path, "Redirecting to login");
        let state = state::encode_state(&request.path);
        GateDecision::Respond(EdgeResponse::redirect(
            &self.flow.urls().login_url(host, &state),
        ))
    }
}
