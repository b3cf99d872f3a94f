//! Redis checkpoint cache for the sweepstake draw engine.
//!
//! The cache is the fast, non-authoritative checkpoint tier. Each event keeps
//! only its latest checkpoint under `sweepstake:checkpoint:{event_id}` as
//! JSON, written with `SET EX` so abandoned entries expire on their own.
//! Freshness is judged by the engine from the checkpoint's `saved_at`, not
//! from the key TTL.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use sweepstake_redis::RedisCheckpointCache;
//!
//! let cache = RedisCheckpointCache::new("redis://127.0.0.1:6379", Duration::from_secs(3600)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::time::Duration;
use sweepstake_core::error::StoreError;
use sweepstake_core::store::{CheckpointCache, StoreFuture};
use sweepstake_core::types::{DrawCheckpoint, EventId};

/// Checkpoint cache backed by Redis.
///
/// Cloning shares the underlying `ConnectionManager`.
#[derive(Clone)]
pub struct RedisCheckpointCache {
    conn_manager: ConnectionManager,
    ttl_seconds: u64,
}

impl std::fmt::Debug for RedisCheckpointCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCheckpointCache")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl RedisCheckpointCache {
    /// Connect to `redis_url`, keeping entries for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the URL is malformed or the server cannot
    /// be reached.
    pub async fn new(redis_url: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Database(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        tracing::info!(ttl_seconds = ttl.as_secs(), "RedisCheckpointCache initialized");

        Ok(Self {
            conn_manager,
            ttl_seconds: ttl.as_secs().max(1),
        })
    }

    fn checkpoint_key(event_id: EventId) -> String {
        format!("sweepstake:checkpoint:{event_id}")
    }
}

fn map_redis_error(error: RedisError) -> StoreError {
    if error.is_timeout() {
        StoreError::Timeout(error.to_string())
    } else if error.is_connection_dropped() || error.is_connection_refusal() || error.is_io_error()
    {
        StoreError::Unavailable(error.to_string())
    } else {
        StoreError::Database(error.to_string())
    }
}

impl CheckpointCache for RedisCheckpointCache {
    fn put(&self, checkpoint: DrawCheckpoint) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let key = Self::checkpoint_key(checkpoint.event_id);
            let payload = serde_json::to_vec(&checkpoint)?;

            let _: () = conn
                .set_ex(&key, payload, self.ttl_seconds)
                .await
                .map_err(map_redis_error)?;

            tracing::debug!(
                event_id = %checkpoint.event_id,
                current_step = checkpoint.current_step,
                "Cached checkpoint"
            );
            Ok(())
        })
    }

    fn get(&self, event_id: EventId) -> StoreFuture<'_, Option<DrawCheckpoint>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let payload: Option<Vec<u8>> = conn
                .get(Self::checkpoint_key(event_id))
                .await
                .map_err(map_redis_error)?;

            Ok(payload
                .map(|bytes| serde_json::from_slice(&bytes))
                .transpose()?)
        })
    }

    fn remove(&self, event_id: EventId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .del(Self::checkpoint_key(event_id))
                .await
                .map_err(map_redis_error)?;
            Ok(())
        })
    }
}
