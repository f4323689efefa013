//! Identity provider key-set retrieval
//!
//! The validator fetches the provider's JWKS before looking at a token.
//! In claims-only mode the set only has to be reachable and non-empty;
//! with signature verification enabled its keys are used to verify.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use parking_lot::RwLock;
use tracing::debug;

/// Key-set retrieval failures.
#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    /// Network or HTTP error while fetching the set
    #[error("JWKS fetch error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("JWKS endpoint returned HTTP {0}")]
    Status(u16),

    /// The set contains no keys
    #[error("JWKS contains no keys")]
    Empty,
}

/// Source of the provider's current public key set.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetch the current key set.
    async fn fetch(&self) -> Result<JwkSet, KeySetError>;
}

/// Derive the JWKS URI from the issuer URL.
#[must_use]
pub fn jwks_uri(issuer: &str) -> String {
    let base = issuer.trim_end_matches('/');
    format!("{base}/.well-known/jwks.json")
}

/// Fetches `{issuer}/.well-known/jwks.json` over HTTP.
pub struct HttpKeySetFetcher {
    http: reqwest::Client,
    uri: String,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `issuer` using a shared client.
    #[must_use]
    pub fn new(http: reqwest::Client, issuer: &str) -> Self {
        Self {
            http,
            uri: jwks_uri(issuer),
        }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        debug!(uri = %self.uri, "Fetching JWKS");
        let response = self.http.get(&self.uri).send().await?;
        if !response.status().is_success() {
            return Err(KeySetError::Status(response.status().as_u16()));
        }
        let jwks: JwkSet = response.json().await?;
        if jwks.keys.is_empty() {
            return Err(KeySetError::Empty);
        }
        Ok(jwks)
    }
}

/// Cached JWKS entry.
struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Reuses a fetched key set for `ttl`; a zero TTL always fetches.
pub struct CachingKeySetFetcher<F> {
    inner: F,
    ttl: Duration,
    cached: RwLock<Option<CachedJwks>>,
}

impl<F: KeySetFetcher> CachingKeySetFetcher<F> {
    /// Wrap `inner` with a TTL cache.
    #[must_use]
    pub fn new(inner: F, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: RwLock::new(None),
        }
    }
}

#[async_trait]
impl<F: KeySetFetcher> KeySetFetcher for CachingKeySetFetcher<F> {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        let hit = if self.ttl.is_zero() {
            None
        } else {
            self.cached
                .read()
                .as_ref()
                .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
                .map(|cached| cached.keys.clone())
        };
        if let Some(keys) = hit {
            return Ok(keys);
        }

        let keys = self.inner.fetch().await?;
        if !self.ttl.is_zero() {
            *self.cached.write() = Some(CachedJwks {
                keys: keys.clone(),
                fetched_at: Instant::now(),
            });
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct CountingFetcher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl KeySetFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<JwkSet, KeySetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::from_value(serde_json::json!({
                "keys": [{"kty": "RSA", "kid": "k1", "n": "AQAB", "e": "AQAB", "alg": "RS256"}]
            }))
            .unwrap())
        }
    }

    #[test]
    fn jwks_uri_appends_well_known() {
        assert_eq!(
            jwks_uri("https://cognito-idp.us-east-1.amazonaws.com/us-east-1_abc"),
            "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_abc/.well-known/jwks.json"
        );
    }

    #[test]
    fn jwks_uri_handles_trailing_slash() {
        assert_eq!(
            jwks_uri("https://issuer.example.com/"),
            "https://issuer.example.com/.well-known/jwks.json"
        );
    }

    #[tokio::test]
    async fn zero_ttl_fetches_every_time() {
        let fetcher = CachingKeySetFetcher::new(
            CountingFetcher {
                calls: AtomicU32::new(0),
            },
            Duration::ZERO,
        );

        fetcher.fetch().await.unwrap();
        fetcher.fetch().await.unwrap();

        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ttl_reuses_key_set() {
        let fetcher = CachingKeySetFetcher::new(
            CountingFetcher {
                calls: AtomicU32::new(0),
            },
            Duration::from_secs(60),
        );

        let first = fetcher.fetch().await.unwrap();
        let second = fetcher.fetch().await.unwrap();

        assert_eq!(first.keys.len(), second.keys.len());
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 1);
    }
}
