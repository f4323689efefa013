//! Secret resolution with a freshness-windowed cache
//!
//! The OAuth client secret lives in an external store. [`SecretCache`] keeps
//! the last successfully fetched value per name and serves it for the
//! configured window (300s by default). When a refresh fails and a cached
//! value exists, the stale value is served and the event logged; the cache
//! is never cleared on failure.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::config::{SecretBackend, SecretsConfig};
use crate::{Error, Result};

/// An external key-value secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the current value of `name`.
    ///
    /// `with_decryption` mirrors parameter stores that hold encrypted values;
    /// stores without encryption ignore it.
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<String>;
}

/// No value could be returned for a secret.
#[derive(Debug, thiserror::Error)]
#[error("Secret '{name}' unavailable and not cached: {source}")]
pub struct SecretFetchError {
    /// Parameter name
    pub name: String,
    /// The store failure
    #[source]
    pub source: Box<Error>,
}

/// A cached secret value.
#[derive(Debug, Clone)]
struct SecretCacheEntry {
    value: String,
    fetched_at: i64,
}

/// Process-wide secret cache with a fixed freshness window.
pub struct SecretCache {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    ttl: i64,
    entries: Mutex<HashMap<String, SecretCacheEntry>>,
}

impl SecretCache {
    /// Create an empty cache in front of `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the value for `name`, refreshing it once the window has passed.
    ///
    /// # Errors
    ///
    /// Returns [`SecretFetchError`] only when the store fails and no value
    /// was ever cached for `name`.
    pub async fn get(&self, name: &str) -> std::result::Result<String, SecretFetchError> {
        let now = self.clock.now();
        let cached = self.entries.lock().get(name).cloned();

        if let Some(entry) = &cached {
            if now - entry.fetched_at < self.ttl {
                debug!(name = %name, "Using cached secret");
                return Ok(entry.value.clone());
            }
        }

        debug!(name = %name, "Fetching secret from store");
        match self.store.get_parameter(name, true).await {
            Ok(value) => {
                self.entries.lock().insert(
                    name.to_string(),
                    SecretCacheEntry {
                        value: value.clone(),
                        fetched_at: now,
                    },
                );
                debug!(name = %name, "Secret fetched and cached");
                Ok(value)
            }
            Err(e) => {
                error!(name = %name, error = %e, "Secret store fetch failed");
                if let Some(entry) = cached {
                    warn!(
                        name = %name,
                        age_secs = now - entry.fetched_at,
                        "Serving stale cached secret (degraded mode)"
                    );
                    Ok(entry.value)
                } else {
                    Err(SecretFetchError {
                        name: name.to_string(),
                        source: Box::new(e),
                    })
                }
            }
        }
    }

    /// Warm the cache for `name`; failures are logged and swallowed.
    pub async fn prefetch(&self, name: &str) {
        match self.get(name).await {
            Ok(_) => debug!(name = %name, "Pre-fetched secret at startup"),
            Err(e) => error!(error = %e, "Failed to pre-fetch secret"),
        }
    }
}

/// Build the store selected by configuration.
#[must_use]
pub fn store_from_config(config: &SecretsConfig) -> Arc<dyn SecretStore> {
    match config.backend {
        SecretBackend::Env => Arc::new(EnvSecretStore::new(&config.env_prefix)),
        SecretBackend::File => Arc::new(FileSecretStore::new(&config.directory)),
        SecretBackend::Keychain => Arc::new(KeychainSecretStore),
    }
}

/// Resolves `name` to an environment variable.
///
/// `/auth/client/secret` with prefix `EDGE_SECRET_` reads `EDGE_SECRET_AUTH_CLIENT_SECRET`.
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    /// Create a store reading variables with `prefix`.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Environment variable holding `name`.
    #[must_use]
    pub fn variable_for(&self, name: &str) -> String {
        let mut var = self.prefix.clone();
        let mut last_underscore = var.ends_with('_') || var.is_empty();
        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                var.push(c.to_ascii_uppercase());
                last_underscore = false;
            } else if !last_underscore {
                var.push('_');
                last_underscore = true;
            }
        }
        while var.ends_with('_') && var.len() > self.prefix.len() {
            var.pop();
        }
        var
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_parameter(&self, name: &str, _with_decryption: bool) -> Result<String> {
        let var = self.variable_for(name);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Ok(value),
            Ok(_) => Err(Error::Upstream(format!("Environment variable {var} is empty"))),
            Err(_) => Err(Error::Upstream(format!("Environment variable {var} is not set"))),
        }
    }
}

/// Reads `name` as a file path below a root directory (mounted secrets).
///
/// The file is re-read on every fetch so rotated values are picked up.
pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    /// Create a store rooted at `root`.
    #[must_use]
    pub fn new(root: &str) -> Self {
        Self {
            root: PathBuf::from(root),
        }
    }

    /// File holding `name`.
    ///
    /// # Errors
    ///
    /// Rejects names containing `..` segments.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let relative = name.trim_start_matches('/');
        if relative.is_empty() || relative.split('/').any(|seg| seg == "..") {
            return Err(Error::Upstream(format!("Invalid secret name '{name}'")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_parameter(&self, name: &str, _with_decryption: bool) -> Result<String> {
        let path = self.path_for(name)?;
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Upstream(format!("Failed to read secret file {}: {e}", path.display()))
        })?;
        let value = raw.trim().to_string();
        if value.is_empty() {
            return Err(Error::Upstream(format!(
                "Secret file {} is empty",
                path.display()
            )));
        }
        Ok(value)
    }
}

/// Looks `name` up as a service in the system keychain.
///
/// - **macOS**: `security find-generic-password -s NAME -w`
/// - **Linux**: `secret-tool lookup service NAME`
pub struct KeychainSecretStore;

#[async_trait]
impl SecretStore for KeychainSecretStore {
    async fn get_parameter(&self, name: &str, _with_decryption: bool) -> Result<String> {
        fetch_from_keychain(name).await
    }
}

#[cfg(target_os = "macos")]
async fn fetch_from_keychain(service: &str) -> Result<String> {
    let output = tokio::process::Command::new("security")
        .args(["find-generic-password", "-s", service, "-w"])
        .output()
        .await
        .map_err(|e| Error::Upstream(format!("Failed to access macOS Keychain: {e}")))?;
    keychain_output(service, &output)
}

#[cfg(target_os = "linux")]
async fn fetch_from_keychain(service: &str) -> Result<String> {
    let output = tokio::process::Command::new("secret-tool")
        .args(["lookup", "service", service])
        .output()
        .await
        .map_err(|e| {
            Error::Upstream(format!(
                "Failed to access Linux secret service: {e}. Is libsecret installed?"
            ))
        })?;
    keychain_output(service, &output)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
async fn fetch_from_keychain(_service: &str) -> Result<String> {
    Err(Error::Config(
        "Keychain access is only supported on macOS and Linux. \
        Use the env or file secret backend instead."
            .to_string(),
    ))
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn keychain_output(service: &str, output: &std::process::Output) -> Result<String> {
    if output.status.success() {
        let secret = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if secret.is_empty() {
            Err(Error::Upstream(format!("Keychain entry '{service}' is empty")))
        } else {
            Ok(secret)
        }
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(service = service, error = %stderr, "Keychain lookup failed");
        Err(Error::Upstream(format!("Keychain entry '{service}' not found")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::clock::ManualClock;

    /// Store that replays scripted results and counts calls.
    struct ScriptedStore {
        results: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedStore {
        fn new(results: Vec<Result<String>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl SecretStore for ScriptedStore {
        async fn get_parameter(&self, _name: &str, with_decryption: bool) -> Result<String> {
            assert!(with_decryption);
            *self.calls.lock() += 1;
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Upstream("script exhausted".to_string())))
        }
    }

    fn cache_with(store: Arc<ScriptedStore>, clock: Arc<ManualClock>) -> SecretCache {
        SecretCache::new(store, clock, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn fresh_value_served_from_cache() {
        // GIVEN: a store that answers once
        let store = Arc::new(ScriptedStore::new(vec![Ok("s1".to_string())]));
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache_with(Arc::clone(&store), Arc::clone(&clock));

        // WHEN: fetched twice inside the window
        assert_eq!(cache.get("secret").await.unwrap(), "s1");
        clock.advance(299);
        assert_eq!(cache.get("secret").await.unwrap(), "s1");

        // THEN: the store was hit once
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn refreshes_after_window() {
        let store = Arc::new(ScriptedStore::new(vec![
            Ok("s1".to_string()),
            Ok("s2".to_string()),
        ]));
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache_with(Arc::clone(&store), Arc::clone(&clock));

        assert_eq!(cache.get("secret").await.unwrap(), "s1");
        clock.advance(300);
        assert_eq!(cache.get("secret").await.unwrap(), "s2");
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn stale_value_served_when_refresh_fails() {
        // GIVEN: a value cached, then a failing store, then a recovered store
        let store = Arc::new(ScriptedStore::new(vec![
            Ok("s1".to_string()),
            Err(Error::Upstream("throttled".to_string())),
            Ok("s2".to_string()),
        ]));
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache_with(Arc::clone(&store), Arc::clone(&clock));
        assert_eq!(cache.get("secret").await.unwrap(), "s1");

        // WHEN: the refresh fails
        clock.advance(400);
        let degraded = cache.get("secret").await.unwrap();

        // THEN: the stale value is served, and the next call refetches immediately
        assert_eq!(degraded, "s1");
        assert_eq!(cache.get("secret").await.unwrap(), "s2");
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn error_without_cached_value() {
        let store = Arc::new(ScriptedStore::new(vec![Err(Error::Upstream(
            "unreachable".to_string(),
        ))]));
        let cache = cache_with(store, Arc::new(ManualClock::new(0)));

        let err = cache.get("/auth/client_secret").await.unwrap_err();
        assert_eq!(err.name, "/auth/client_secret");
        assert!(err.to_string().contains("unreachable"));
    }

    #[tokio::test]
    async fn prefetch_swallows_errors() {
        let store = Arc::new(ScriptedStore::new(vec![
            Err(Error::Upstream("cold".to_string())),
            Ok("warm".to_string()),
        ]));
        let cache = cache_with(Arc::clone(&store), Arc::new(ManualClock::new(0)));

        cache.prefetch("secret").await;
        assert_eq!(cache.get("secret").await.unwrap(), "warm");
    }

    #[test]
    fn env_variable_name_derivation() {
        let store = EnvSecretStore::new("EDGE_SECRET_");
        assert_eq!(
            store.variable_for("/auth/cognito_user_pool_client/main/client_secret"),
            "EDGE_SECRET_AUTH_COGNITO_USER_POOL_CLIENT_MAIN_CLIENT_SECRET"
        );
        assert_eq!(store.variable_for("client-secret/"), "EDGE_SECRET_CLIENT_SECRET");
    }

    #[tokio::test]
    async fn env_store_reports_missing_variable() {
        let store = EnvSecretStore::new("EDGE_SECRET_TEST_MISSING_");
        let err = store.get_parameter("nothing/here", true).await.unwrap_err();
        assert!(err.to_string().contains("EDGE_SECRET_TEST_MISSING_NOTHING_HERE"));
    }

    #[tokio::test]
    async fn file_store_reads_and_trims() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("auth")).unwrap();
        std::fs::write(dir.path().join("auth/client_secret"), "hunter2\n").unwrap();

        let store = FileSecretStore::new(dir.path().to_str().unwrap());
        let value = store.get_parameter("/auth/client_secret", true).await.unwrap();
        assert_eq!(value, "hunter2");
    }

    #[test]
    fn file_store_rejects_traversal() {
        let store = FileSecretStore::new("/run/secrets");
        assert!(store.path_for("/../etc/passwd").is_err());
        assert!(store.path_for("/").is_err());
        assert_eq!(
            store.path_for("/auth/x").unwrap(),
            PathBuf::from("/run/secrets/auth/x")
        );
    }
}
