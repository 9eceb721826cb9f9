//! Queue depth introspection against the cache store.
//!
//! The consumer binary keeps a queue's pending list under
//! `rq:queue:<name>`, so the inspector resolves that key before asking
//! the store for its length.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use thiserror::Error;

/// Key prefix the consumer binary stores queues under.
const QUEUE_KEY_PREFIX: &str = "rq:queue:";

/// Store key holding a queue's pending list.
pub fn queue_key(queue_name: &str) -> String {
    format!("{QUEUE_KEY_PREFIX}{queue_name}")
}

/// Errors that can occur while inspecting a queue.
#[derive(Debug, Error)]
pub enum StatusError {
    /// Failed to connect to the cache store.
    #[error("Cache store connection failed for {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A store operation failed after connecting.
    #[error("Cache store operation failed: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Pending-job snapshot for one queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Queue name.
    pub queue: String,
    /// Jobs waiting to be consumed.
    pub pending: usize,
}

/// Read-only view of a queue in the store.
pub struct QueueInspector {
    redis: ConnectionManager,
    queue_name: String,
    queue_key: String,
}

impl QueueInspector {
    /// Connects to the store and binds to a queue.
    ///
    /// # Errors
    ///
    /// Returns `StatusError::ConnectionFailed` if the connection fails.
    pub async fn connect(store_url: &str, queue_name: &str) -> Result<Self, StatusError> {
        let client =
            redis::Client::open(store_url).map_err(|e| StatusError::ConnectionFailed {
                url: store_url.to_string(),
                reason: e.to_string(),
            })?;

        let redis = ConnectionManager::new(client).await.map_err(|e| {
            StatusError::ConnectionFailed {
                url: store_url.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            redis,
            queue_name: queue_name.to_string(),
            queue_key: queue_key(queue_name),
        })
    }

    /// Number of jobs waiting in the queue.
    pub async fn pending(&self) -> Result<usize, StatusError> {
        let mut conn = self.redis.clone();
        let pending: usize = conn.llen(&self.queue_key).await?;
        Ok(pending)
    }

    /// Full snapshot of the queue.
    pub async fn status(&self) -> Result<QueueStatus, StatusError> {
        Ok(QueueStatus {
            queue: self.queue_name.clone(),
            pending: self.pending().await?,
        })
    }

    /// The queue this inspector is bound to.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// The store key the inspector reads.
    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }
}
