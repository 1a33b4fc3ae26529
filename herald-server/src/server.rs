//! HTTP server

use std::net::SocketAddr;

use axum::Router;
use herald_common::{Signal, internal};
use tokio::{net::TcpListener, sync::broadcast};
use tower_http::timeout::TimeoutLayer;

use crate::{AppState, ServerConfig, ServerError, routes};

/// The public HTTP surface: webhooks, the send API and the health probes.
pub struct ApiServer {
    listener: TcpListener,
    router: Router,
}

impl ApiServer {
    /// Bind the listener and build the router.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn new(config: &ServerConfig, state: AppState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| ServerError::BindError {
                address: config.listen_address.clone(),
                source: e,
            })?;

        internal!(
            level = INFO,
            address = %config.listen_address,
            "HTTP server bound successfully"
        );

        let router = routes::router(state, config).layer(TimeoutLayer::new(config.request_timeout()));

        Ok(Self { listener, router })
    }

    /// The bound address; differs from the configured one when port 0 was
    /// asked for.
    ///
    /// # Errors
    ///
    /// If the socket cannot report its address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until the shutdown signal is received
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), ServerError> {
        internal!("HTTP server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                internal!("HTTP server received shutdown signal");
            })
            .await
            .map_err(|e| ServerError::ServerError(e.to_string()))?;

        internal!("HTTP server stopped");
        Ok(())
    }
}
