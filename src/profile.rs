//! Deployment profiles for the API server and its cache store.
//!
//! A profile bundles everything a launch needs: the configuration file the
//! downstream application loads, the cache databases to flush before the
//! server starts, and the server binding (host, port, worker count, request
//! timeout). Profiles are explicit values handed to the launcher; the
//! configuration selector is attached to each spawned child's environment
//! rather than exported into the supervisor's own process environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable the downstream application reads to locate its
/// configuration file. Set on spawned children only.
pub const CONFIG_ENV_VAR: &str = "API_CONFIG";

/// Queue name the consumer processes subscribe to by default.
pub const DEFAULT_QUEUE: &str = "default";

/// Application target handed to the ASGI server, `module:attribute` form.
pub const DEFAULT_APP_MODULE: &str = "api.main:app";

/// Errors that can occur while resolving a deployment profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The requested profile name has no preset.
    #[error("Unknown profile '{0}' (expected licensed, open or default)")]
    UnknownProfile(String),

    /// The profile's configuration file is missing.
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),
}

/// Cache databases to clear before a server start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushTarget {
    /// Cache store host.
    pub host: String,
    /// Cache store port.
    pub port: u16,
    /// Numeric database indices to clear.
    pub databases: Vec<u8>,
}

impl Default for FlushTarget {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            databases: vec![1, 2, 3],
        }
    }
}

impl FlushTarget {
    /// Creates a flush target for the given host, port and databases.
    pub fn new(host: impl Into<String>, port: u16, databases: Vec<u8>) -> Self {
        Self {
            host: host.into(),
            port,
            databases,
        }
    }

    /// Connection URL for one database index.
    pub fn db_url(&self, db: u8) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, db)
    }
}

/// Address and capacity the HTTP server binds with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBinding {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Number of server worker processes.
    pub workers: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ServerBinding {
    /// The `host:port` form used by the server's `--bind` argument.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A named deployment profile: configuration file, flush targets and
/// server binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchProfile {
    /// Profile name (licensed, open, default).
    pub name: String,
    /// Configuration file the downstream application loads.
    pub config_path: PathBuf,
    /// Application target for the ASGI server.
    pub app_module: String,
    /// Cache databases cleared before the server starts. `None` skips the
    /// flush step entirely.
    pub flush: Option<FlushTarget>,
    /// Server binding.
    pub server: ServerBinding,
}

impl LaunchProfile {
    /// The licensed deployment: public store on 6379, server on 8032.
    pub fn licensed() -> Self {
        Self {
            name: "licensed".to_string(),
            config_path: PathBuf::from(".config.licensed.toml"),
            app_module: DEFAULT_APP_MODULE.to_string(),
            flush: Some(FlushTarget::new("localhost", 6379, vec![1, 2, 3])),
            server: ServerBinding {
                host: "0.0.0.0".to_string(),
                port: 8032,
                workers: 10,
                timeout_secs: 120,
            },
        }
    }

    /// The open deployment: store on 5379, server on 8022.
    pub fn open() -> Self {
        Self {
            name: "open".to_string(),
            config_path: PathBuf::from(".config.open.toml"),
            app_module: DEFAULT_APP_MODULE.to_string(),
            flush: Some(FlushTarget::new("localhost", 5379, vec![1, 2, 3])),
            server: ServerBinding {
                host: "0.0.0.0".to_string(),
                port: 8022,
                workers: 10,
                timeout_secs: 120,
            },
        }
    }

    /// The development deployment: default store, single worker on 8000.
    pub fn development() -> Self {
        Self {
            name: "default".to_string(),
            config_path: PathBuf::from(".config.toml"),
            app_module: DEFAULT_APP_MODULE.to_string(),
            flush: Some(FlushTarget::default()),
            server: ServerBinding {
                host: "127.0.0.1".to_string(),
                port: 8000,
                workers: 1,
                timeout_secs: 120,
            },
        }
    }

    /// Resolves a profile preset by name.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::UnknownProfile` for anything other than
    /// `licensed`, `open` or `default`.
    pub fn preset(name: &str) -> Result<Self, ProfileError> {
        match name {
            "licensed" => Ok(Self::licensed()),
            "open" => Ok(Self::open()),
            "default" => Ok(Self::development()),
            other => Err(ProfileError::UnknownProfile(other.to_string())),
        }
    }

    /// Sets the configuration file path.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Sets the application target.
    pub fn with_app_module(mut self, app: impl Into<String>) -> Self {
        self.app_module = app.into();
        self
    }

    /// Sets the server host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.server.host = host.into();
        self
    }

    /// Sets the server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Sets the server worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.server.workers = workers;
        self
    }

    /// Sets the request timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.server.timeout_secs = timeout_secs;
        self
    }

    /// Checks the launch preconditions.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::ConfigNotFound` if the configuration file
    /// does not exist. The downstream application would otherwise fall
    /// back to a default profile without any warning.
    pub fn validate(&self) -> Result<(), ProfileError> {
        ensure_config_exists(&self.config_path)
    }
}

/// Checks that a downstream configuration file exists.
pub fn ensure_config_exists(path: &Path) -> Result<(), ProfileError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ProfileError::ConfigNotFound(path.to_path_buf()))
    }
}
