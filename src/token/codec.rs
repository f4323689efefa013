//! Compact token codec (`header.payload.signature`)
//!
//! Decodes the two base64url JSON segments of a compact signed token and
//! passes the signature through untouched. Nothing here verifies a
//! signature; see [`crate::token::validator`] for what is checked.

use base64::Engine as _;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::Value;

/// Segment delimiter of the compact serialization.
pub const SEGMENT_DELIMITER: char = '.';

/// Why a token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not exactly three dot-delimited segments
    #[error("expected 3 segments, found {0}")]
    SegmentCount(usize),
    /// A segment is not valid base64url
    #[error("{segment} segment is not valid base64url")]
    Base64 {
        /// Which segment failed
        segment: &'static str,
    },
    /// A segment is not valid JSON
    #[error("{segment} segment is not valid JSON")]
    Json {
        /// Which segment failed
        segment: &'static str,
    },
    /// The payload's claims have unexpected types
    #[error("payload claims have unexpected types: {0}")]
    Claims(String),
}

/// The three structural parts of a token.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    /// Header object (`alg`, `kid`, ...)
    pub header: Value,
    /// Payload claims
    pub payload: Value,
    /// Signature segment, still base64url encoded
    pub signature: String,
}

impl DecodedToken {
    /// Typed view of the claims the gate inspects.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Claims`] when a known claim has the wrong JSON type.
    pub fn claims(&self) -> Result<Claims, DecodeError> {
        Claims::deserialize(&self.payload).map_err(|e| DecodeError::Claims(e.to_string()))
    }

    /// The `kid` header field, if present.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.header.get("kid").and_then(Value::as_str)
    }
}

/// Claims checked by the validator. Absent claims are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Expiration (Unix seconds)
    #[serde(default)]
    pub exp: Option<i64>,
    /// Issuer
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience (client id)
    #[serde(default)]
    pub aud: Option<String>,
    /// Cognito token kind: `id` or `access`
    #[serde(default)]
    pub token_use: Option<String>,
}

/// Split and decode a token.
///
/// # Errors
///
/// Fails unless the token has exactly three segments and the first two
/// decode as base64url JSON.
pub fn decode(token: &str) -> Result<DecodedToken, DecodeError> {
    let segments: Vec<&str> = token.split(SEGMENT_DELIMITER).collect();
    let [header, payload, signature] = segments.as_slice() else {
        return Err(DecodeError::SegmentCount(segments.len()));
    };

    Ok(DecodedToken {
        header: decode_segment(header, "header")?,
        payload: decode_segment(payload, "payload")?,
        signature: (*signature).to_string(),
    })
}

/// Encode header and payload objects into the compact form.
#[must_use]
pub fn encode(header: &Value, payload: &Value, signature: &str) -> String {
    format!(
        "{}.{}.{signature}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string()),
    )
}

/// Read only the `exp` claim of a token's payload segment.
///
/// The segment count is not enforced so that longer serializations whose
/// second segment is not JSON simply yield `None`.
#[must_use]
pub fn parse_expiry(token: &str) -> Option<i64> {
    let payload = token.split(SEGMENT_DELIMITER).nth(1)?;
    let value = decode_segment(payload, "payload").ok()?;
    value.get("exp").and_then(Value::as_i64)
}

fn decode_segment(segment: &str, name: &'static str) -> Result<Value, DecodeError> {
    let mut padded = segment.to_string();
    let rem = padded.len() % 4;
    if rem != 0 {
        padded.extend(std::iter::repeat_n('=', 4 - rem));
    }

    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|_| DecodeError::Base64 { segment: name })?;
    serde_json::from_slice(&bytes).map_err(|_| DecodeError::Json { segment: name })
}
