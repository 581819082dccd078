//! Server lifecycle: bind, serve in the background, stop on request.
//!
//! A [`WebApi`] moves through `Stopped -> Starting -> Running -> Stopping ->
//! Stopped`. [`WebApi::start`] returns once the socket is bound; the returned
//! [`ServerHandle`] stops the server and reports exactly once when serving has
//! ended, whether through a stop request or a serve error.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;

use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::AppState;
use crate::config::Config;
use crate::error::ServerError;
use crate::routes;

/// Certificate and key files for HTTPS
#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Where and how to listen
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub addr: SocketAddr,
    /// Serve HTTPS when set
    pub tls: Option<TlsFiles>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Why serving ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    /// A stop was requested and in-flight requests drained
    Shutdown,
    /// The listener failed
    Failed(String),
}

type ServeFuture = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

/// One server instance with its own router and shutdown trigger.
pub struct WebApi {
    options: ServerOptions,
    state: AppState,
    status: watch::Sender<ServerState>,
}

impl WebApi {
    pub fn new(options: ServerOptions, app_dir: PathBuf, data_dir: PathBuf, config: Config) -> Self {
        let (status, _) = watch::channel(ServerState::Stopped);
        Self {
            options,
            state: AppState::with_config(app_dir, data_dir, config),
            status,
        }
    }

    /// Router of this instance, without a listener attached.
    pub fn router(&self) -> Router {
        routes::app_router(self.state.clone())
    }

    pub fn status(&self) -> ServerState {
        *self.status.borrow()
    }

    /// Bind the listener and start serving on a background task.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        self.status.send_replace(ServerState::Starting);

        match self.launch().await {
            Ok(handle) => Ok(handle),
            Err(err) => {
                error!("Failed to start server: {}", err);
                self.status.send_replace(ServerState::Stopped);
                Err(err)
            }
        }
    }

    async fn launch(&self) -> Result<ServerHandle, ServerError> {
        let tls_config = match &self.options.tls {
            Some(tls) => Some(
                RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                    .await
                    .map_err(|source| ServerError::Tls {
                        cert: tls.cert.display().to_string(),
                        key: tls.key.display().to_string(),
                        source,
                    })?,
            ),
            None => None,
        };

        let listener = TcpListener::bind(self.options.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.options.addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.state.shutdown.clone();

        let serving: ServeFuture = match tls_config {
            None => {
                let status = self.status.clone();
                let shutdown = shutdown.clone();
                let signal = async move {
                    shutdown.cancelled().await;
                    status.send_replace(ServerState::Stopping);
                    info!("Stopping server, draining in-flight requests");
                };
                Box::pin(async move {
                    axum::serve(listener, app)
                        .with_graceful_shutdown(signal)
                        .await
                })
            }
            Some(config) => {
                info!("Using TLS (HTTPS)");
                let std_listener = listener.into_std()?;
                let handle = Handle::new();
                let watcher = {
                    let handle = handle.clone();
                    let status = self.status.clone();
                    let shutdown = shutdown.clone();
                    let grace = self.state.config.shutdown_grace();
                    tokio::spawn(async move {
                        shutdown.cancelled().await;
                        status.send_replace(ServerState::Stopping);
                        info!("Stopping server, draining in-flight requests");
                        handle.graceful_shutdown(Some(grace));
                    })
                };
                let server = axum_server::from_tcp_rustls(std_listener, config).handle(handle);
                Box::pin(async move {
                    let result = server.serve(app).await;
                    watcher.abort();
                    result
                })
            }
        };

        info!(
            "Serving path {} on {} (data in {})",
            self.state.app_dir.display(),
            local_addr,
            self.state.data_dir.display()
        );
        self.status.send_replace(ServerState::Running);

        let (done_tx, done_rx) = oneshot::channel();
        let status = self.status.clone();
        tokio::spawn(async move {
            let outcome = match serving.await {
                Ok(()) => {
                    info!("Server stopped");
                    ServeOutcome::Shutdown
                }
                Err(err) => {
                    error!("Server failed: {}", err);
                    ServeOutcome::Failed(err.to_string())
                }
            };
            status.send_replace(ServerState::Stopped);
            let _ = done_tx.send(outcome);
        });

        Ok(ServerHandle {
            local_addr,
            shutdown,
            status: self.status.subscribe(),
            done: done_rx,
        })
    }
}

/// Control handle of a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    status: watch::Receiver<ServerState>,
    done: oneshot::Receiver<ServeOutcome>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Request a graceful stop. Safe to call more than once.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Token that stops the server when cancelled, for signal handlers.
    pub fn stopper(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn status(&self) -> ServerState {
        *self.status.borrow()
    }

    /// Wait until serving has ended.
    pub async fn wait(self) -> ServeOutcome {
        self.done.await.unwrap_or_else(|_| {
            ServeOutcome::Failed("server task ended unexpectedly".to_string())
        })
    }
}
