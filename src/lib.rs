//! Edge Authentication Gate
//!
//! Sits in front of a web origin and enforces OAuth2/OIDC login on
//! configured path patterns.
//!
//! # Features
//!
//! - **Path policy**: exact and `/*` prefix patterns, first match wins
//! - **Session cookies**: `id_token`, `access_token`, `refresh_token`, all
//!   `Secure; HttpOnly; SameSite=Lax`
//! - **Authorization-code flow**: login redirect, callback exchange, logout
//! - **Token checks**: expiry, issuer, audience and `token_use`, with optional
//!   JWKS signature verification
//! - **Secret cache**: client secret refreshed every 300s, stale value served
//!   when the store is down
//!
//! The gate itself ([`gate::RequestGate`]) is host agnostic; [`server`]
//! adapts it to an HTTP listener that proxies passed-through requests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod secrets;
pub mod server;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let initialized = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    initialized.map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))
}
