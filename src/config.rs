//! Configuration management
//!
//! Loaded once at startup and passed by reference into every component.

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Default SSM-style name of the OAuth client secret.
pub const DEFAULT_CLIENT_SECRET_NAME: &str = "/auth/cognito_user_pool_client/main/client_secret";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load after the config is parsed.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// HTTP host adapter configuration
    pub server: ServerConfig,
    /// Identity provider and path policy configuration
    pub auth: AuthConfig,
    /// Secret store configuration
    pub secrets: SecretsConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (EDGE_AUTH_ prefix, `__` nests sections)
        figment = figment.merge(Env::prefixed("EDGE_AUTH_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Secrets resolved through the env backend may live in these files
        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Check that every value required to serve is present and well formed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        require("auth.client_id", &self.auth.client_id)?;
        require("auth.auth_domain", &self.auth.auth_domain)?;
        require("auth.issuer", &self.auth.issuer)?;
        require("server.origin_url", &self.server.origin_url)?;
        require("secrets.client_secret_name", &self.secrets.client_secret_name)?;

        if self.auth.auth_domain.contains("://") || self.auth.auth_domain.contains('/') {
            return Err(Error::Config(format!(
                "auth.auth_domain must be a bare host name, got '{}'",
                self.auth.auth_domain
            )));
        }

        Url::parse(&self.auth.issuer)
            .map_err(|e| Error::Config(format!("auth.issuer is not a valid URL: {e}")))?;

        let origin = Url::parse(&self.server.origin_url)
            .map_err(|e| Error::Config(format!("server.origin_url is not a valid URL: {e}")))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "server.origin_url must be http(s), got '{}'",
                origin.scheme()
            )));
        }

        if let Some(bad) = self
            .auth
            .protected_paths
            .iter()
            .find(|p| !p.starts_with('/'))
        {
            return Err(Error::Config(format!(
                "protected path '{bad}' must start with '/'"
            )));
        }

        if self.auth.http_timeout.is_zero() {
            return Err(Error::Config(
                "auth.http_timeout must be greater than zero".to_string(),
            ));
        }

        if self.secrets.backend == SecretBackend::File && self.secrets.directory.is_empty() {
            return Err(Error::Config(
                "secrets.directory is required for the file backend".to_string(),
            ));
        }

        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::Config(format!("Missing required value: {field}")))
    } else {
        Ok(())
    }
}

/// HTTP host adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Origin that pass-through requests are forwarded to
    pub origin_url: String,
    /// Timeout for forwarded origin requests
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39480,
            origin_url: String::new(),
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Identity provider and path policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client id; also the expected `aud` claim
    pub client_id: String,
    /// Hosted login domain, e.g. `auth.example.com`
    pub auth_domain: String,
    /// Expected `iss` claim; the key set lives under `{issuer}/.well-known/jwks.json`
    pub issuer: String,
    /// Protected path patterns, exact (`/profile`) or prefix (`/admin/*`)
    pub protected_paths: Vec<String>,
    /// Scopes requested at login
    pub scope: String,
    /// Timeout for key-set and token endpoint calls
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
    /// How long a fetched key set is reused; zero fetches on every validation
    #[serde(with = "humantime_serde")]
    pub jwks_cache_ttl: Duration,
    /// Verify token signatures against the key set (claims-only when false)
    pub verify_signature: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            auth_domain: String::new(),
            issuer: String::new(),
            protected_paths: Vec::new(),
            scope: "email openid profile".to_string(),
            http_timeout: Duration::from_secs(5),
            jwks_cache_ttl: Duration::ZERO,
            verify_signature: false,
        }
    }
}

/// Where the client secret is fetched from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    /// Environment variables
    #[default]
    Env,
    /// One file per secret below a directory
    File,
    /// macOS Keychain / Linux secret service
    Keychain,
}

/// Secret store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Store backend
    pub backend: SecretBackend,
    /// Prefix for the env backend's variable names
    pub env_prefix: String,
    /// Root directory for the file backend
    pub directory: String,
    /// Name of the OAuth client secret parameter
    pub client_secret_name: String,
    /// Freshness window of a cached secret
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: SecretBackend::Env,
            env_prefix: "EDGE_SECRET_".to_string(),
            directory: "/run/secrets".to_string(),
            client_secret_name: DEFAULT_CLIENT_SECRET_NAME.to_string(),
            ttl: Duration::from_secs(300),
        }
    }
}
