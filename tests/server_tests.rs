//! HTTP adapter tests
//!
//! Runs the router against a real origin listening on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::Request,
    http::{Method, StatusCode, header},
    response::IntoResponse,
};
use edge_auth_gate::clock::{Clock, ManualClock};
use edge_auth_gate::config::{AuthConfig, Config, ServerConfig};
use edge_auth_gate::gate::{
    CodeExchange, Collaborators, ExchangeError, RequestGate, TokenEndpoint, TokenSet,
};
use edge_auth_gate::secrets::{SecretCache, SecretStore};
use edge_auth_gate::server::Server;
use edge_auth_gate::token::{KeySetError, KeySetFetcher};
use edge_auth_gate::{Error, Result};
use bytes::Bytes;
use jsonwebtoken::jwk::JwkSet;
use tokio::net::TcpListener;
use tower::ServiceExt;

struct NoKeys;

#[async_trait]
impl KeySetFetcher for NoKeys {
    async fn fetch(&self) -> std::result::Result<JwkSet, KeySetError> {
        Err(KeySetError::Empty)
    }
}

struct NoSecret;

#[async_trait]
impl SecretStore for NoSecret {
    async fn get_parameter(&self, _name: &str, _with_decryption: bool) -> Result<String> {
        Err(Error::Upstream("offline".to_string()))
    }
}

struct NoTokens;

#[async_trait]
impl TokenEndpoint for NoTokens {
    async fn exchange(
        &self,
        _request: CodeExchange<'_>,
    ) -> std::result::Result<TokenSet, ExchangeError> {
        Err(ExchangeError::MalformedResponse)
    }
}

/// Origin that echoes what it received.
async fn echo(request: Request) -> impl IntoResponse {
    let forwarded_host = request
        .headers()
        .get("x-forwarded-host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let line = format!(
        "{} {} host={forwarded_host}",
        request.method(),
        request.uri()
    );
    let body = to_bytes(request.into_body(), usize::MAX).await.unwrap();
    (
        StatusCode::IM_A_TEAPOT,
        [("x-origin", "yes")],
        format!("{line} body={}", String::from_utf8_lossy(&body)),
    )
}

async fn spawn_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().fallback(echo))
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

fn app(origin_url: &str) -> Router {
    let config = Config {
        server: ServerConfig {
            origin_url: origin_url.to_string(),
            max_body_size: 16,
            request_timeout: Duration::from_secs(5),
            ..ServerConfig::default()
        },
        auth: AuthConfig {
            client_id: "client-abc".to_string(),
            auth_domain: "login.example.com".to_string(),
            issuer: "https://issuer.example.com".to_string(),
            protected_paths: vec!["/private/*".to_string()],
            ..AuthConfig::default()
        },
        ..Config::default()
    };
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_700_000_000));
    let collaborators = Collaborators {
        secrets: Arc::new(SecretCache::new(
            Arc::new(NoSecret),
            Arc::clone(&clock),
            Duration::from_secs(300),
        )),
        keys: Arc::new(NoKeys),
        tokens: Arc::new(NoTokens),
        clock,
    };
    let gate = RequestGate::new(&config, collaborators).unwrap();
    Server::with_gate(config, gate).router().unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn public_request_is_proxied_to_origin() {
    let origin = spawn_origin().await;

    let response = app(&origin)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/public/form?x=1")
                .header(header::HOST, "app.example.com")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(response.headers()["x-origin"], "yes");
    assert_eq!(
        body_text(response).await,
        "POST /public/form?x=1 host=app.example.com body=hello"
    );
}

#[tokio::test]
async fn protected_request_is_redirected_not_proxied() {
    let origin = spawn_origin().await;

    let response = app(&origin)
        .oneshot(
            Request::builder()
                .uri("/private/report")
                .header(header::HOST, "app.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .starts_with("https://login.example.com/login?")
    );
    assert!(response.headers().get("x-origin").is_none());
}

#[tokio::test]
async fn logout_emits_three_set_cookie_headers() {
    let origin = spawn_origin().await;

    let response = app(&origin)
        .oneshot(
            Request::builder()
                .uri("/auth/logout")
                .header(header::HOST, "app.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 3);
}

#[tokio::test]
async fn error_page_served_as_html() {
    let origin = spawn_origin().await;

    let response = app(&origin)
        .oneshot(
            Request::builder()
                .uri("/auth/error?message=oops")
                .header(header::HOST, "app.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    assert!(body_text(response).await.contains("Authentication Error"));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let origin = spawn_origin().await;

    let response = app(&origin)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/upload")
                .header(header::HOST, "app.example.com")
                .body(Body::from(vec![b'x'; 64]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn broken_body_stream_is_bad_request() {
    let origin = spawn_origin().await;

    // GIVEN: a body that fails mid-stream, well under the size limit
    let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"ab")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
    ];

    // WHEN: it is sent to a public path
    let response = app(&origin)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/upload")
                .header(header::HOST, "app.example.com")
                .body(Body::from_stream(futures::stream::iter(chunks)))
                .unwrap(),
        )
        .await
        .unwrap();

    // THEN: it is a client error, not a size error, and never reaches the origin
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get("x-origin").is_none());
}

#[tokio::test]
async fn unreachable_origin_is_bad_gateway() {
    // bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let response = app(&format!("http://{addr}"))
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::HOST, "app.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
