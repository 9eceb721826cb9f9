//! Cache flush against the store's numeric databases.
//!
//! The launcher scripts this replaces shelled out to a clear-cache utility
//! and never looked at its exit status. Here the flush talks to the store
//! directly and returns a result the caller must check: a failed flush
//! aborts the launch instead of silently starting the server on a stale
//! cache.

use redis::aio::ConnectionManager;
use serde::Serialize;
use thiserror::Error;

use crate::profile::FlushTarget;

/// Errors that can occur while flushing cache databases.
#[derive(Debug, Error)]
pub enum FlushError {
    /// Failed to connect to the cache store.
    #[error("Cache store connection failed for {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A store operation failed after connecting.
    #[error("Cache store operation failed: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Per-database flush outcome.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseFlush {
    /// Database index.
    pub db: u8,
    /// Number of keys the database held before the flush.
    pub keys_removed: usize,
}

/// Summary of one flush run.
#[derive(Debug, Clone, Serialize)]
pub struct FlushReport {
    /// Cache store host.
    pub host: String,
    /// Cache store port.
    pub port: u16,
    /// Outcome for each flushed database, in flush order.
    pub databases: Vec<DatabaseFlush>,
}

impl FlushReport {
    /// Total keys removed across all databases.
    pub fn total_keys_removed(&self) -> usize {
        self.databases.iter().map(|d| d.keys_removed).sum()
    }
}

/// Clears selected databases in the cache store.
#[derive(Debug, Clone)]
pub struct CacheFlusher {
    target: FlushTarget,
}

impl CacheFlusher {
    /// Creates a flusher for the given target.
    pub fn new(target: FlushTarget) -> Self {
        Self { target }
    }

    /// Flushes every database in the target and reports what was removed.
    ///
    /// Databases are flushed sequentially in the order given; the first
    /// failure aborts the run.
    ///
    /// # Errors
    ///
    /// Returns `FlushError::ConnectionFailed` if the store is unreachable
    /// and `FlushError::Redis` for any failing store command.
    pub async fn flush(&self) -> Result<FlushReport, FlushError> {
        let mut databases = Vec::with_capacity(self.target.databases.len());

        for &db in &self.target.databases {
            let keys_removed = self.flush_db(db).await?;
            tracing::info!(db = db, keys_removed = keys_removed, "flushed cache database");
            databases.push(DatabaseFlush { db, keys_removed });
        }

        Ok(FlushReport {
            host: self.target.host.clone(),
            port: self.target.port,
            databases,
        })
    }

    /// Flushes a single database, returning the number of keys it held.
    async fn flush_db(&self, db: u8) -> Result<usize, FlushError> {
        let url = self.target.db_url(db);

        let client = redis::Client::open(url.as_str()).map_err(|e| {
            FlushError::ConnectionFailed {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut conn = ConnectionManager::new(client).await.map_err(|e| {
            FlushError::ConnectionFailed {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;

        // The connection URL already selects the database, so DBSIZE and
        // FLUSHDB act on the right index.
        let keys: usize = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        redis::cmd("FLUSHDB").query_async::<_, ()>(&mut conn).await?;

        Ok(keys)
    }

    /// The target this flusher clears.
    pub fn target(&self) -> &FlushTarget {
        &self.target
    }
}
