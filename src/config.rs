use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum request body size for document writes (in bytes)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Directories under the application root that are not applications
    #[serde(default = "default_reserved_app_dirs")]
    pub reserved_app_dirs: Vec<String>,

    /// Write documents to a temp file and rename it over the target
    #[serde(default = "default_true")]
    pub atomic_writes: bool,

    /// Allow data paths whose symlinks point outside the data directory
    #[serde(default)]
    pub allow_symlink_escape: bool,

    /// Accept the shutdown trigger from non-loopback peers
    #[serde(default)]
    pub allow_remote_shutdown: bool,

    /// Token required in the `x-shutdown-token` header, if set
    #[serde(default)]
    pub shutdown_token: Option<String>,

    /// How long in-flight TLS connections may drain after a stop (seconds)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Add permissive CORS headers
    #[serde(default)]
    pub cors: bool,
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024 // 10 MB
}

fn default_reserved_app_dirs() -> Vec<String> {
    vec!["was".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_body_size: default_max_body_size(),
            reserved_app_dirs: default_reserved_app_dirs(),
            atomic_writes: default_true(),
            allow_symlink_escape: false,
            allow_remote_shutdown: false,
            shutdown_token: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
            cors: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Check if an application directory is reserved
    pub fn is_reserved_app_dir(&self, name: &str) -> bool {
        self.reserved_app_dirs.iter().any(|d| d == name)
    }
}
