//! Web application server with a file-backed JSON data API.
//!
//! Serves static application bundles from one directory and maps `/data/...`
//! requests onto JSON documents and directories under another. The library can
//! be embedded; the `waserver` binary is a thin CLI on top of [`WebApi`].

pub mod aggregate;
pub mod config;
pub mod error;
pub mod handlers;
pub mod listing;
pub mod paths;
pub mod routes;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use config::Config;
pub use error::{DataError, ServerError};
pub use server::{ServeOutcome, ServerHandle, ServerOptions, ServerState, TlsFiles, WebApi};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Root directory of the static application bundles
    pub app_dir: PathBuf,
    /// Root directory of the JSON documents
    pub data_dir: PathBuf,
    /// Configuration
    pub config: Arc<Config>,
    /// Cancelled to stop the server owning this state
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new AppState with the given roots and default config.
    pub fn new(app_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self::with_config(app_dir, data_dir, Config::default())
    }

    /// Create a new AppState with the given roots and config.
    pub fn with_config(app_dir: PathBuf, data_dir: PathBuf, config: Config) -> Self {
        Self {
            app_dir,
            data_dir,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}
