//! HTTP Server
//!
//! Binds the REST routes on TCP and serves them until stopped.

use crate::handler::{self, AppState};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 7070;

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// HTTP Server
pub struct HttpServer {
    config: HttpServerConfig,
    state: AppState,
}

/// Running server; `stop` begins a graceful shutdown
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections; in-flight requests are allowed to finish
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the server task to exit
    pub async fn stopped(self) -> Result<(), String> {
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("HTTP server failed: {}", e)),
            Err(e) => Err(format!("HTTP server task failed: {}", e)),
        }
    }
}

/// Route table
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/backups",
            get(handler::list_backups).post(handler::create_backup),
        )
        .route(
            "/backups/:id",
            get(handler::get_backup).delete(handler::delete_backup),
        )
        .with_state(state)
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Bind and start serving in a background task
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting HTTP server"
        );

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind HTTP server on {}: {}", addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let app = router(self.state);

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = &result {
                error!(error = %e, "HTTP server stopped with error");
            }
            result
        });

        info!(addr = %local_addr, "HTTP server started successfully");

        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}
