//! HTTP host adapter: runs the gate in front of an origin

mod origin;
mod router;

pub use origin::OriginClient;
pub use router::{AppState, create_router};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::config::Config;
use crate::gate::RequestGate;
use crate::{Error, Result};

/// Edge authentication server
pub struct Server {
    config: Config,
    gate: Arc<RequestGate>,
}

impl Server {
    /// Create a server with production collaborators.
    pub fn new(config: Config) -> Result<Self> {
        let gate = RequestGate::from_config(&config)?;
        Ok(Self::with_gate(config, gate))
    }

    /// Create a server around an already assembled gate.
    #[must_use]
    pub fn with_gate(config: Config, gate: RequestGate) -> Self {
        Self {
            config,
            gate: Arc::new(gate),
        }
    }

    /// Build the router without binding.
    pub fn router(&self) -> Result<Router> {
        let origin = OriginClient::new(
            &self.config.server.origin_url,
            self.config.server.request_timeout,
        )?;
        Ok(create_router(Arc::new(AppState {
            gate: Arc::clone(&self.gate),
            origin,
            max_body_size: self.config.server.max_body_size,
        })))
    }

    /// Run until SIGINT/SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        self.gate.prefetch_secret().await;
        let app = self.router()?;
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("EDGE AUTH GATE v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(origin = %self.config.server.origin_url, "Forwarding to origin");
        info!(auth_domain = %self.config.auth.auth_domain, "Identity provider");
        for pattern in self.gate.protected_paths().patterns() {
            info!("  protected: {pattern}");
        }
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
