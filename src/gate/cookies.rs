//! Session cookie construction and request cookie parsing

use std::collections::HashMap;

use chrono::DateTime;

/// Cookie holding the ID token
pub const ID_TOKEN: &str = "id_token";
/// Cookie holding the access token
pub const ACCESS_TOKEN: &str = "access_token";
/// Cookie holding the refresh token
pub const REFRESH_TOKEN: &str = "refresh_token";

/// All session cookies, in the order they are set.
pub const SESSION_COOKIES: [&str; 3] = [ID_TOKEN, ACCESS_TOKEN, REFRESH_TOKEN];

/// Attributes shared by every session cookie.
const SECURITY_ATTRIBUTES: &str = "Secure; HttpOnly; SameSite=Lax";

/// Build a `Set-Cookie` value.
///
/// `expires` is a Unix timestamp rendered as an RFC 1123 GMT date; without
/// it the cookie lasts for the browser session.
#[must_use]
pub fn make_cookie(name: &str, value: &str, expires: Option<i64>, path: &str) -> String {
    let mut cookie = format!("{name}={value}; {SECURITY_ATTRIBUTES}; Path={path}");
    if let Some(date) = expires.and_then(http_date) {
        cookie.push_str("; Expires=");
        cookie.push_str(&date);
    }
    cookie
}

/// Build a `Set-Cookie` value that deletes `name`.
#[must_use]
pub fn expire_cookie(name: &str, path: &str) -> String {
    format!("{name}=; {SECURITY_ATTRIBUTES}; Path={path}; Max-Age=0")
}

/// Format a Unix timestamp as an HTTP date (`Tue, 14 Nov 2023 22:13:20 GMT`).
#[must_use]
pub fn http_date(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// Parse `cookie` header values into a name → value map.
///
/// Pairs are split on `;`, then on the first `=`; names and values are
/// trimmed. Later duplicates overwrite earlier ones.
pub fn parse_cookies<'a>(headers: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in headers {
        for pair in header.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }
    cookies
}
