//! Worker pool of job-queue consumer processes.
//!
//! Spawns a fixed count of identical consumer processes, each polling the
//! same queue on the same store database, and waits on all of them. The
//! shell scripts this replaces backgrounded all but the last consumer and
//! used that one's foreground status as a proxy for "pool still running";
//! here the supervisor owns every child and returns only when all of them
//! have exited. Crashed consumers are logged, not restarted; any restart
//! policy stays with the process manager above this supervisor.

use std::path::PathBuf;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::profile::{ensure_config_exists, ProfileError, CONFIG_ENV_VAR, DEFAULT_QUEUE};

use super::child::{ChildSpec, SpawnError};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Profile validation failed.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// A consumer process could not be spawned.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// Waiting on a consumer process failed.
    #[error("Failed to wait on consumer process: {0}")]
    Wait(std::io::Error),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Configuration file the consumers load.
    pub config_path: PathBuf,
    /// Cache store host.
    pub host: String,
    /// Cache store port.
    pub port: u16,
    /// Store database index holding the queue.
    pub db: u8,
    /// Queue the consumers subscribe to.
    pub queue_name: String,
    /// Number of consumer processes to spawn.
    pub count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(".config.toml"),
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            queue_name: DEFAULT_QUEUE.to_string(),
            count: 5,
        }
    }
}

impl PoolConfig {
    /// Sets the configuration file path.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Sets the store host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the store port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the store database index.
    pub fn with_db(mut self, db: u8) -> Self {
        self.db = db;
        self
    }

    /// Sets the queue name.
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Sets the number of consumer processes.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Store connection URL with the database index embedded.
    pub fn store_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Exit summary for one pool run.
#[derive(Debug, Clone, Serialize)]
pub struct PoolOutcome {
    /// Exit code per consumer, in spawn order. `None` means the process
    /// was terminated by a signal.
    pub exit_codes: Vec<Option<i32>>,
}

impl PoolOutcome {
    /// Whether every consumer exited with status zero.
    pub fn all_clean(&self) -> bool {
        self.exit_codes.iter().all(|code| *code == Some(0))
    }

    /// Number of consumers that did not exit cleanly.
    pub fn failed(&self) -> usize {
        self.exit_codes
            .iter()
            .filter(|code| **code != Some(0))
            .count()
    }
}

/// Pool of identical job-queue consumer processes.
pub struct WorkerPool {
    config: PoolConfig,
}

impl WorkerPool {
    /// Creates a pool with the given configuration.
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    /// Builds the consumer invocations. All of them share the same store
    /// URL, database index and queue name.
    pub fn child_specs(&self) -> Vec<ChildSpec> {
        let url = self.config.store_url();
        (0..self.config.count)
            .map(|_| {
                ChildSpec::new("rq")
                    .args(["worker", "--url", url.as_str(), self.config.queue_name.as_str()])
                    .env(
                        CONFIG_ENV_VAR,
                        self.config.config_path.to_string_lossy().to_string(),
                    )
            })
            .collect()
    }

    /// Spawns every consumer and waits until all of them have exited.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Profile` if the configuration file is missing
    /// and `PoolError::Spawn` if any consumer fails to start. A spawn
    /// failure leaves already-started consumers running; they keep the
    /// queue drained while the operator intervenes.
    pub async fn launch(&self) -> Result<PoolOutcome, PoolError> {
        ensure_config_exists(&self.config.config_path)?;

        let specs = self.child_specs();
        let mut children = Vec::with_capacity(specs.len());

        for (index, spec) in specs.iter().enumerate() {
            let child = spec.spawn()?;
            info!(
                consumer = index,
                pid = child.id(),
                command = %spec.command_line(),
                "consumer started"
            );
            children.push(child);
        }

        info!(
            count = self.config.count,
            queue = %self.config.queue_name,
            url = %self.config.store_url(),
            "worker pool running"
        );

        let waits = children.into_iter().map(|mut child| async move { child.wait().await });
        let statuses = join_all(waits).await;

        let mut exit_codes = Vec::with_capacity(statuses.len());
        for (index, status) in statuses.into_iter().enumerate() {
            let status = status.map_err(PoolError::Wait)?;
            if !status.success() {
                warn!(consumer = index, status = %status, "consumer exited abnormally");
            }
            exit_codes.push(status.code());
        }

        let outcome = PoolOutcome { exit_codes };
        info!(failed = outcome.failed(), "worker pool finished");
        Ok(outcome)
    }

    /// The pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.count, 5);
        assert_eq!(config.queue_name, "default");
        assert_eq!(config.db, 0);
        assert_eq!(config.store_url(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_spawns_five_identical_consumers() {
        let pool = WorkerPool::new(PoolConfig::default());
        let specs = pool.child_specs();

        assert_eq!(specs.len(), 5);
        for spec in &specs {
            assert_eq!(spec, &specs[0]);
            assert_eq!(spec.program, "rq");
            assert_eq!(
                spec.args,
                vec!["worker", "--url", "redis://localhost:6379/0", "default"]
            );
            assert_eq!(spec.env_value(CONFIG_ENV_VAR), Some(".config.toml"));
        }
    }

    #[test]
    fn test_config_overrides_flow_into_specs() {
        let config = PoolConfig::default()
            .with_config_path("/etc/api/.config.licensed.toml")
            .with_port(5379)
            .with_db(4)
            .with_queue_name("priority")
            .with_count(2);
        let pool = WorkerPool::new(config);
        let specs = pool.child_specs();

        assert_eq!(specs.len(), 2);
        assert_eq!(
            specs[0].args,
            vec!["worker", "--url", "redis://localhost:5379/4", "priority"]
        );
        assert_eq!(
            specs[0].env_value(CONFIG_ENV_VAR),
            Some("/etc/api/.config.licensed.toml")
        );
    }

    #[test]
    fn test_outcome_helpers() {
        let clean = PoolOutcome {
            exit_codes: vec![Some(0); 5],
        };
        assert!(clean.all_clean());
        assert_eq!(clean.failed(), 0);

        let mixed = PoolOutcome {
            exit_codes: vec![Some(0), Some(1), None, Some(0), Some(0)],
        };
        assert!(!mixed.all_clean());
        assert_eq!(mixed.failed(), 2);
    }
}
