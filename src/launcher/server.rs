//! Foreground launch of the HTTP application server.
//!
//! Two interchangeable launch styles exist for the same application: a
//! prefork server (gunicorn driving uvicorn worker processes) for the
//! deployed profiles, and plain uvicorn for development, optionally with
//! auto-reload. Both serve the same `module:app` target.

use std::process::ExitStatus;

use thiserror::Error;
use tracing::info;

use crate::flush::{CacheFlusher, FlushError};
use crate::profile::{LaunchProfile, ProfileError, CONFIG_ENV_VAR};

use super::child::{ChildSpec, SpawnError};

/// Default access-log destination for the prefork server (stdout).
pub const DEFAULT_ACCESS_LOG: &str = "-";

/// Worker class gunicorn runs the ASGI application under.
const UVICORN_WORKER_CLASS: &str = "uvicorn.workers.UvicornWorker";

/// Errors that can occur while launching the server.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Profile resolution or validation failed.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// The pre-launch cache flush failed.
    #[error("Cache flush failed before server launch: {0}")]
    Flush(#[from] FlushError),

    /// The server process could not be spawned.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// Waiting on the server process failed.
    #[error("Failed to wait on server process: {0}")]
    Wait(std::io::Error),

    /// The requested launch style has no implementation.
    #[error("Unknown server style '{0}' (expected gunicorn or uvicorn)")]
    UnknownStyle(String),
}

/// How the application server is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStyle {
    /// Prefork server with uvicorn worker processes, fixed request timeout
    /// and access logging.
    Gunicorn,
    /// Plain uvicorn, used for development runs.
    Uvicorn,
}

impl ServerStyle {
    /// Resolves a style by name.
    pub fn parse(name: &str) -> Result<Self, LaunchError> {
        match name {
            "gunicorn" => Ok(Self::Gunicorn),
            "uvicorn" => Ok(Self::Uvicorn),
            other => Err(LaunchError::UnknownStyle(other.to_string())),
        }
    }
}

/// One server launch: a profile plus the invocation style.
///
/// Building the launch resolves everything up front; `child_spec` is pure
/// so the exact invocation can be inspected (and tested) without spawning.
#[derive(Debug, Clone)]
pub struct ServerLaunch {
    profile: LaunchProfile,
    style: ServerStyle,
    access_log: String,
    reload: bool,
    skip_flush: bool,
    program_override: Option<String>,
}

impl ServerLaunch {
    /// Creates a launch for the given profile and style.
    pub fn new(profile: LaunchProfile, style: ServerStyle) -> Self {
        Self {
            profile,
            style,
            access_log: DEFAULT_ACCESS_LOG.to_string(),
            reload: false,
            skip_flush: false,
            program_override: None,
        }
    }

    /// Overrides the server executable, for deployments where the server
    /// lives inside a virtualenv rather than on PATH.
    pub fn with_server_program(mut self, program: impl Into<String>) -> Self {
        self.program_override = Some(program.into());
        self
    }

    /// Sets the access-log destination (gunicorn style only).
    pub fn with_access_log(mut self, dest: impl Into<String>) -> Self {
        self.access_log = dest.into();
        self
    }

    /// Enables auto-reload (uvicorn style only).
    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    /// Skips the pre-launch cache flush, keeping the cache warm across a
    /// restart.
    pub fn with_skip_flush(mut self, skip: bool) -> Self {
        self.skip_flush = skip;
        self
    }

    /// The profile this launch runs under.
    pub fn profile(&self) -> &LaunchProfile {
        &self.profile
    }

    /// Builds the server invocation. The configuration selector is
    /// attached to this child only; the supervisor's own environment is
    /// never touched.
    pub fn child_spec(&self) -> ChildSpec {
        let server = &self.profile.server;

        let workers = server.workers.to_string();
        let program = self.program_override.clone().unwrap_or_else(|| {
            match self.style {
                ServerStyle::Gunicorn => "gunicorn".to_string(),
                ServerStyle::Uvicorn => "uvicorn".to_string(),
            }
        });

        let spec = match self.style {
            ServerStyle::Gunicorn => {
                let bind = server.bind_address();
                let timeout = server.timeout_secs.to_string();
                ChildSpec::new(program)
                    .arg(&self.profile.app_module)
                    .args(["--bind", bind.as_str()])
                    .args(["--workers", workers.as_str()])
                    .args(["--worker-class", UVICORN_WORKER_CLASS])
                    .args(["--timeout", timeout.as_str()])
                    .args(["--access-logfile", self.access_log.as_str()])
            }
            ServerStyle::Uvicorn => {
                let port = server.port.to_string();
                let spec = ChildSpec::new(program)
                    .arg(&self.profile.app_module)
                    .args(["--host", server.host.as_str()])
                    .args(["--port", port.as_str()])
                    .args(["--workers", workers.as_str()]);
                if self.reload {
                    spec.arg("--reload")
                } else {
                    spec
                }
            }
        };

        spec.env(
            CONFIG_ENV_VAR,
            self.profile.config_path.to_string_lossy().to_string(),
        )
    }

    /// Flushes the cache, then runs the server in the foreground until it
    /// exits.
    ///
    /// The flush result is checked: a failed flush aborts the launch and
    /// the server is never spawned.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Profile` if the configuration file is
    /// missing, `LaunchError::Flush` if the flush fails, and spawn/wait
    /// errors from the server process itself.
    pub async fn launch(&self) -> Result<ExitStatus, LaunchError> {
        self.profile.validate()?;

        if self.skip_flush {
            info!(profile = %self.profile.name, "skipping cache flush");
        } else if let Some(target) = &self.profile.flush {
            let report = CacheFlusher::new(target.clone()).flush().await?;
            info!(
                host = %report.host,
                port = report.port,
                keys_removed = report.total_keys_removed(),
                "cache flushed"
            );
        }

        let spec = self.child_spec();
        info!(
            profile = %self.profile.name,
            command = %spec.command_line(),
            "starting API server"
        );

        let mut child = spec.spawn()?;
        let status = child.wait().await.map_err(LaunchError::Wait)?;

        info!(profile = %self.profile.name, status = %status, "API server exited");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::FlushTarget;

    // Nothing listens on this port, so any flush against it fails fast.
    const UNREACHABLE_STORE_PORT: u16 = 1;

    #[test]
    fn test_licensed_gunicorn_invocation() {
        let launch = ServerLaunch::new(LaunchProfile::licensed(), ServerStyle::Gunicorn);
        let spec = launch.child_spec();

        assert_eq!(spec.program, "gunicorn");
        assert_eq!(
            spec.args,
            vec![
                "api.main:app",
                "--bind",
                "0.0.0.0:8032",
                "--workers",
                "10",
                "--worker-class",
                "uvicorn.workers.UvicornWorker",
                "--timeout",
                "120",
                "--access-logfile",
                "-",
            ]
        );
        assert_eq!(
            spec.env_value(CONFIG_ENV_VAR),
            Some(".config.licensed.toml")
        );
    }

    #[test]
    fn test_uvicorn_invocation() {
        let launch = ServerLaunch::new(LaunchProfile::development(), ServerStyle::Uvicorn);
        let spec = launch.child_spec();

        assert_eq!(spec.program, "uvicorn");
        assert_eq!(
            spec.args,
            vec!["api.main:app", "--host", "127.0.0.1", "--port", "8000", "--workers", "1"]
        );
    }

    #[test]
    fn test_uvicorn_reload_flag() {
        let launch = ServerLaunch::new(LaunchProfile::development(), ServerStyle::Uvicorn)
            .with_reload(true);
        assert_eq!(launch.child_spec().args.last().map(String::as_str), Some("--reload"));
    }

    #[test]
    fn test_access_log_override() {
        let launch = ServerLaunch::new(LaunchProfile::open(), ServerStyle::Gunicorn)
            .with_access_log("/var/log/api/access.log");
        let spec = launch.child_spec();
        assert_eq!(
            spec.args.last().map(String::as_str),
            Some("/var/log/api/access.log")
        );
    }

    #[test]
    fn test_config_selectors_stay_independent() {
        // Two launches with different configuration files must each carry
        // their own selector.
        let licensed = ServerLaunch::new(LaunchProfile::licensed(), ServerStyle::Gunicorn);
        let open = ServerLaunch::new(LaunchProfile::open(), ServerStyle::Gunicorn);

        let licensed_spec = licensed.child_spec();
        let open_spec = open.child_spec();

        assert_eq!(
            licensed_spec.env_value(CONFIG_ENV_VAR),
            Some(".config.licensed.toml")
        );
        assert_eq!(open_spec.env_value(CONFIG_ENV_VAR), Some(".config.open.toml"));
        assert_ne!(
            licensed_spec.env_value(CONFIG_ENV_VAR),
            open_spec.env_value(CONFIG_ENV_VAR)
        );
    }

    #[test]
    fn test_server_program_override() {
        let launch = ServerLaunch::new(LaunchProfile::licensed(), ServerStyle::Gunicorn)
            .with_server_program("/opt/venv/bin/gunicorn");
        assert_eq!(launch.child_spec().program, "/opt/venv/bin/gunicorn");
    }

    #[tokio::test]
    async fn test_failed_flush_aborts_before_server_spawn() {
        let config = tempfile::NamedTempFile::new().expect("temp config");
        let mut profile = LaunchProfile::licensed().with_config_path(config.path());
        profile.flush = Some(FlushTarget::new("localhost", UNREACHABLE_STORE_PORT, vec![1]));

        // A spawn attempt on this program would surface as
        // LaunchError::Spawn, so a Flush error proves the server was
        // never started.
        let launch = ServerLaunch::new(profile, ServerStyle::Gunicorn)
            .with_server_program("/nonexistent/api-server");

        let err = launch.launch().await.unwrap_err();
        assert!(matches!(err, LaunchError::Flush(_)));
    }

    #[tokio::test]
    async fn test_skip_flush_bypasses_unreachable_store() {
        let config = tempfile::NamedTempFile::new().expect("temp config");
        let mut profile = LaunchProfile::licensed().with_config_path(config.path());
        profile.flush = Some(FlushTarget::new("localhost", UNREACHABLE_STORE_PORT, vec![1]));

        let launch = ServerLaunch::new(profile, ServerStyle::Gunicorn)
            .with_server_program("/nonexistent/api-server")
            .with_skip_flush(true);

        // With the flush skipped the launch reaches the spawn, which
        // fails on the missing program instead of the unreachable store.
        let err = launch.launch().await.unwrap_err();
        assert!(matches!(err, LaunchError::Spawn(_)));
    }

    #[test]
    fn test_style_parse() {
        assert_eq!(ServerStyle::parse("gunicorn").unwrap(), ServerStyle::Gunicorn);
        assert_eq!(ServerStyle::parse("uvicorn").unwrap(), ServerStyle::Uvicorn);

        let err = ServerStyle::parse("hypercorn").unwrap_err();
        assert!(err.to_string().contains("hypercorn"));
    }
}
