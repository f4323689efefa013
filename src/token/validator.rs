//! ID token validation
//!
//! # Validation flow
//!
//! Steps run in a fixed order and stop at the first failure:
//!
//! 1. Fetch the provider's key set; unreachable or empty fails closed.
//! 2. Decode the token structure.
//! 3. (signature mode only) Verify the signature with the key named by `kid`.
//! 4. `exp` must be present and not in the past (`exp >= now`).
//! 5. `iss` must equal the configured issuer.
//! 6. `aud` must equal the configured client id.
//! 7. `token_use` must be `id`.
//!
//! # Security properties
//!
//! In the default claims-only mode the signature is **not** verified. Any
//! party able to set a cookie on the protected host can forge a token that
//! passes. Enable `auth.verify_signature` for standard OIDC guarantees.
//!
//! Every failure means "not authenticated"; nothing here panics or
//! propagates to the request path.

use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, jwk::JwkSet};
use tracing::{debug, warn};

use super::codec::{self, DecodeError};
use super::jwks::{KeySetError, KeySetFetcher};
use crate::clock::Clock;
use crate::config::AuthConfig;

/// Required value of the `token_use` claim.
pub const EXPECTED_TOKEN_USE: &str = "id";

/// Why a token was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ValidationFailure {
    /// The key set could not be fetched
    #[error("key set unavailable: {0}")]
    KeySet(#[from] KeySetError),

    /// The token could not be decoded
    #[error("malformed token: {0}")]
    Decode(#[from] DecodeError),

    /// Signature verification failed
    #[error("signature rejected: {0}")]
    Signature(String),

    /// `exp` missing
    #[error("token has no exp claim")]
    MissingExpiry,

    /// `exp` in the past
    #[error("token expired at {exp}, now {now}")]
    Expired {
        /// Expiration claim
        exp: i64,
        /// Validation time
        now: i64,
    },

    /// A string claim did not have the expected value
    #[error("invalid {claim}: expected {expected}, got {actual:?}")]
    ClaimMismatch {
        /// Claim name
        claim: &'static str,
        /// Expected value
        expected: String,
        /// Actual value, if present
        actual: Option<String>,
    },
}

/// Expected claim values.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Expected `iss`
    pub issuer: String,
    /// Expected `aud`
    pub client_id: String,
    /// Verify signatures against the key set
    pub verify_signature: bool,
}

impl From<&AuthConfig> for ValidatorConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            client_id: config.client_id.clone(),
            verify_signature: config.verify_signature,
        }
    }
}

/// Validates ID tokens presented in the `id_token` cookie.
pub struct TokenValidator {
    config: ValidatorConfig,
    keys: Arc<dyn KeySetFetcher>,
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    /// Create a validator.
    #[must_use]
    pub fn new(config: ValidatorConfig, keys: Arc<dyn KeySetFetcher>, clock: Arc<dyn Clock>) -> Self {
        if !config.verify_signature {
            warn!("Token signatures are NOT verified; only claims are checked");
        }
        Self {
            config,
            keys,
            clock,
        }
    }

    /// Whether `token` is an acceptable ID token right now.
    pub async fn is_valid(&self, token: &str) -> bool {
        match self.validate(token).await {
            Ok(()) => {
                debug!("Token validation passed");
                true
            }
            Err(e) => {
                warn!(reason = %e, "Token validation failed");
                false
            }
        }
    }

    /// Run every check and report the first failure.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationFailure`] of the first failing step.
    pub async fn validate(&self, token: &str) -> Result<(), ValidationFailure> {
        let jwks = self.keys.fetch().await?;
        if jwks.keys.is_empty() {
            return Err(KeySetError::Empty.into());
        }

        let decoded = codec::decode(token)?;
        if self.config.verify_signature {
            verify_signature(token, decoded.key_id(), &jwks)?;
        }

        let claims = decoded.claims()?;
        debug!(
            has_exp = claims.exp.is_some(),
            has_iss = claims.iss.is_some(),
            has_aud = claims.aud.is_some(),
            "Decoded token claims"
        );

        let now = self.clock.now();
        let exp = claims.exp.ok_or(ValidationFailure::MissingExpiry)?;
        if exp < now {
            return Err(ValidationFailure::Expired { exp, now });
        }

        expect_claim("iss", claims.iss, &self.config.issuer)?;
        expect_claim("aud", claims.aud, &self.config.client_id)?;
        expect_claim("token_use", claims.token_use, EXPECTED_TOKEN_USE)?;

        Ok(())
    }
}

fn expect_claim(
    claim: &'static str,
    actual: Option<String>,
    expected: &str,
) -> Result<(), ValidationFailure> {
    if actual.as_deref() == Some(expected) {
        Ok(())
    } else {
        Err(ValidationFailure::ClaimMismatch {
            claim,
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Verify the token signature with the JWK named by `kid`.
///
/// Only the signature is checked here; claims are validated by the caller
/// so both modes share the same rules.
fn verify_signature(token: &str, kid: Option<&str>, jwks: &JwkSet) -> Result<(), ValidationFailure> {
    let kid = kid.ok_or_else(|| ValidationFailure::Signature("missing kid".to_string()))?;
    let jwk = jwks
        .find(kid)
        .ok_or_else(|| ValidationFailure::Signature(format!("unknown kid {kid}")))?;

    let header =
        jsonwebtoken::decode_header(token).map_err(|e| ValidationFailure::Signature(e.to_string()))?;
    if !matches!(
        header.alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::ES256
            | Algorithm::ES384
    ) {
        return Err(ValidationFailure::Signature(format!(
            "unsupported algorithm {:?}",
            header.alg
        )));
    }

    let key = DecodingKey::from_jwk(jwk).map_err(|e| ValidationFailure::Signature(e.to_string()))?;

    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    jsonwebtoken::decode::<serde_json::Value>(token, &key, &validation)
        .map(|_| ())
        .map_err(|e| ValidationFailure::Signature(e.to_string()))
}
