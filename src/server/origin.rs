//! Forwarding of passed-through requests to the origin

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::gate::EdgeRequest;
use crate::{Error, Result};

/// Connection-scoped headers never forwarded in either direction.
const HOP_BY_HOP: [header::HeaderName; 8] = [
    header::CONNECTION,
    header::HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// HTTP client for the protected origin.
#[derive(Clone)]
pub struct OriginClient {
    http: reqwest::Client,
    base: String,
}

impl OriginClient {
    /// Create a client forwarding to `origin_url`.
    ///
    /// Redirects are returned to the browser, never followed.
    pub fn new(origin_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build origin client: {e}")))?;
        Ok(Self {
            http,
            base: origin_url.trim_end_matches('/').to_string(),
        })
    }

    /// Origin URL for `request`: base + path + query.
    #[must_use]
    pub fn target_url(&self, request: &EdgeRequest) -> String {
        match request.query.as_deref() {
            Some(query) => format!("{}{}?{query}", self.base, request.path),
            None => format!("{}{}", self.base, request.path),
        }
    }

    /// Forward `request` and relay the origin's answer; 502 when unreachable.
    pub async fn forward(&self, request: EdgeRequest) -> Response {
        let url = self.target_url(&request);
        debug!(method = %request.method, url = %url, "Forwarding to origin");

        let mut headers = request.headers;
        if let Some(host) = headers.remove(header::HOST) {
            headers.insert(X_FORWARDED_HOST, host);
        }
        strip_hop_by_hop(&mut headers);

        let result = self
            .http
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await;

        let upstream = match result {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(url = %url, error = %e, "Origin request failed");
                return (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response();
            }
        };

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // headers named by `Connection` are connection-scoped too
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    for name in named {
        headers.remove(name.as_str());
    }
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}
