//! Inbound request and outbound response values

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use bytes::Bytes;
use tracing::warn;
use url::form_urlencoded;

/// One inbound request, read-only to the gate.
#[derive(Debug, Clone)]
pub struct EdgeRequest {
    /// Request method
    pub method: Method,
    /// URI path, not normalized
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    /// Header multimap (`cookie`, `host`, ...)
    pub headers: HeaderMap,
    /// Request body, forwarded untouched on pass-through
    pub body: Bytes,
}

impl EdgeRequest {
    /// A bodiless GET request.
    #[must_use]
    pub fn get(path: &str, query: Option<&str>) -> Self {
        Self {
            method: Method::GET,
            path: path.to_string(),
            query: query.map(str::to_string),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header; invalid values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }

    /// The `Host` header value.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|h| !h.is_empty())
    }

    /// First value of query parameter `name`, percent-decoded.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// All `cookie` header values.
    pub fn cookie_headers(&self) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }
}

/// A terminal response returned to the client.
#[derive(Debug, Clone)]
pub struct EdgeResponse {
    /// Status code
    pub status: StatusCode,
    /// Header multimap; `Set-Cookie` may repeat
    pub headers: HeaderMap,
    /// Optional body
    pub body: Option<String>,
}

impl EdgeResponse {
    /// A `302 Found` redirect to `location`.
    ///
    /// A location that is not a valid header value redirects to `/` instead.
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        let value = HeaderValue::from_str(location).unwrap_or_else(|_| {
            warn!(location = %location.escape_debug(), "Invalid redirect location, using /");
            HeaderValue::from_static("/")
        });
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, value);
        Self {
            status: StatusCode::FOUND,
            headers,
            body: None,
        }
    }

    /// A `200 OK` HTML page.
    #[must_use]
    pub fn html(body: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        Self {
            status: StatusCode::OK,
            headers,
            body: Some(body.to_string()),
        }
    }

    /// A plain-text `400 Bad Request`.
    #[must_use]
    pub fn bad_request(message: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status: StatusCode::BAD_REQUEST,
            headers,
            body: Some(message.to_string()),
        }
    }

    /// Append one `Set-Cookie` header.
    #[must_use]
    pub fn with_cookie(mut self, cookie: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            self.headers.append(header::SET_COOKIE, value);
        }
        self
    }

    /// The `Location` header, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Every `Set-Cookie` value in order.
    #[must_use]
    pub fn set_cookies(&self) -> Vec<&str> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }
}

/// Outcome of running the gate on one request.
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Forward the original request to the origin unchanged
    PassThrough(EdgeRequest),
    /// Answer the client directly
    Respond(EdgeResponse),
}

impl GateDecision {
    /// The terminal response, if the gate produced one.
    #[must_use]
    pub fn response(&self) -> Option<&EdgeResponse> {
        match self {
            Self::Respond(response) => Some(response),
            Self::PassThrough(_) => None,
        }
    }

    /// Whether the request is forwarded to the origin.
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_is_percent_decoded() {
        let req = EdgeRequest::get("/auth/callback", Some("code=a%2Bb&state=L2Rhc2g&code=second"));
        assert_eq!(req.query_param("code").as_deref(), Some("a+b"));
        assert_eq!(req.query_param("state").as_deref(), Some("L2Rhc2g"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn host_header_read() {
        let req = EdgeRequest::get("/", None).with_header(header::HOST, "app.example.com");
        assert_eq!(req.host(), Some("app.example.com"));
        assert_eq!(EdgeRequest::get("/", None).host(), None);
    }

    #[test]
    fn redirect_with_repeated_cookies() {
        let response = EdgeResponse::redirect("/dashboard")
            .with_cookie("a=1")
            .with_cookie("b=2");

        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(response.location(), Some("/dashboard"));
        assert_eq!(response.set_cookies(), vec!["a=1", "b=2"]);
    }

    #[test]
    fn redirect_always_has_location() {
        for invalid in ["/caf\u{e9}", "/a\r\nSet-Cookie: x=1"] {
            let response = EdgeResponse::redirect(invalid);
            assert_eq!(response.status, StatusCode::FOUND);
            assert_eq!(response.location(), Some("/"));
        }
    }

    #[test]
    fn html_page_has_content_type() {
        let response = EdgeResponse::html("<p>hi</p>");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[header::CONTENT_TYPE], "text/html");
        assert_eq!(response.body.as_deref(), Some("<p>hi</p>"));
    }
}
