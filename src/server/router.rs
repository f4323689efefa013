//! HTTP router: every request goes through the gate

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, State, rejection::BytesRejection},
    http::{HeaderMap, HeaderValue, Method, Uri, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::debug;

use super::origin::OriginClient;
use crate::gate::{EdgeRequest, EdgeResponse, GateDecision, RequestGate};

/// Shared application state
pub struct AppState {
    /// The authentication gate
    pub gate: Arc<RequestGate>,
    /// Destination for passed-through requests
    pub origin: OriginClient,
    /// Maximum accepted request body, in bytes
    pub max_body_size: usize,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_body_size;
    Router::new()
        .fallback(gate_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::new())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

async fn gate_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    // over the limit is 413, a broken body stream is 400
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(status = %rejection.status(), error = %rejection, "Request body rejected");
            return rejection.into_response();
        }
    };

    let edge = to_edge_request(method, &uri, headers, body);
    match state.gate.handle(edge).await {
        GateDecision::Respond(response) => into_response(response),
        GateDecision::PassThrough(request) => state.origin.forward(request).await,
    }
}

/// Lift the buffered request into the gate's model.
fn to_edge_request(method: Method, uri: &Uri, mut headers: HeaderMap, body: Bytes) -> EdgeRequest {
    // HTTP/2 carries the host in the URI authority
    if !headers.contains_key(header::HOST) {
        if let Some(value) = uri
            .authority()
            .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
        {
            headers.insert(header::HOST, value);
        }
    }

    EdgeRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    }
}

fn into_response(edge: EdgeResponse) -> Response {
    let mut response = Response::new(edge.body.map_or_else(Body::empty, Body::from));
    *response.status_mut() = edge.status;
    *response.headers_mut() = edge.headers;
    response
}
