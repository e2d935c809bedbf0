//! Listener and accept loop.

use std::{future::Future, io, sync::Arc};

use tokio::{net::TcpListener, task::JoinSet, time::timeout};

use crate::{config::ServerConfig, usecase::RoutingEngine};

use super::{handler::handle_connection, signal::shutdown_signal};

/// Broadcast to every connection when the server stops.
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down";

/// TCP chat relay server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(engine, ServerConfig::default());
/// server.run().await?;
/// ```
pub struct Server {
    engine: Arc<RoutingEngine>,
    config: ServerConfig,
}

impl Server {
    pub fn new(engine: Arc<RoutingEngine>, config: ServerConfig) -> Self {
        Self { engine, config }
    }

    /// Bind the configured address. A failure here aborts startup.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        TcpListener::bind(self.config.bind_addr()).await
    }

    /// Accept connections until `shutdown` resolves, then close every
    /// connection cooperatively.
    ///
    /// Accept errors are logged and do not stop the loop.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let settings = self.config.connection_settings();
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        tracing::info!("Accepted connection from {}", addr);
                        connections.spawn(handle_connection(
                            stream,
                            addr.to_string(),
                            self.engine.clone(),
                            settings,
                        ));
                    }
                    Err(e) => tracing::warn!("Failed to accept connection: {}", e),
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished
                        && e.is_panic()
                    {
                        tracing::error!("Connection handler panicked: {}", e);
                    }
                }
            }
        }

        drop(listener);
        let notified = self.engine.shutdown_all(SHUTDOWN_NOTICE).await;
        tracing::info!("Stopped accepting; notified {} connection(s)", notified);

        let drain = async { while connections.join_next().await.is_some() {} };
        if timeout(self.config.shutdown_grace, drain).await.is_err() {
            tracing::warn!(
                "{} connection(s) still open after {:?}, aborting",
                connections.len(),
                self.config.shutdown_grace
            );
            connections.shutdown().await;
        }

        Ok(())
    }

    /// Bind and serve until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the configured address.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = self.bind().await?;
        tracing::info!("Chat relay listening on {}", listener.local_addr()?);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}
