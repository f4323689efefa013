//! OAuth `state` parameter: the originally requested path, base64url encoded.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use url::{Position, Url};

/// Destination used when no valid state is available.
pub const DEFAULT_DESTINATION: &str = "/";

/// Accepts padded and unpadded base64url.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode a path for the `state` parameter.
#[must_use]
pub fn encode_state(path: &str) -> String {
    URL_SAFE_NO_PAD.encode(path)
}

/// Decode a `state` parameter back to the string it was built from.
#[must_use]
pub fn decode_state(state: &str) -> Option<String> {
    let bytes = LENIENT_URL_SAFE.decode(state).ok()?;
    String::from_utf8(bytes).ok()
}

/// Where to send the browser after login.
///
/// Anything other than an absolute local path (including `//host` forms)
/// falls back to [`DEFAULT_DESTINATION`]. The result is percent-encoded so
/// it is always a valid `Location` value.
#[must_use]
pub fn destination_from_state(state: Option<&str>) -> String {
    state
        .and_then(decode_state)
        .filter(|path| is_local_path(path))
        .and_then(|path| percent_encode_path(&path))
        .unwrap_or_else(|| DEFAULT_DESTINATION.to_string())
}

/// Percent-encode `path` (with its query), keeping it on this origin.
fn percent_encode_path(path: &str) -> Option<String> {
    let base = Url::parse("http://localhost").ok()?;
    let joined = base.join(path).ok()?;
    if joined.origin() != base.origin() {
        return None;
    }
    let encoded = &joined[Position::BeforePath..];
    is_local_path(encoded).then(|| encoded.to_string())
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}
