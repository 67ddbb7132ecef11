//! Redis-backed window store for multi-process deployments.
//!
//! Every process that fronts the same marketplace account must see the same
//! windows, otherwise each process would grant the full budget independently.
//! This adapter keeps one bincode-encoded `Vec<u64>` per rate-limit key in
//! Redis and delegates expiry to `SETEX`, so entry lifetime is enforced even
//! while the owning process is down.
//!
//! # Key model
//!
//! Redis keys are the [`RateLimitKey`] string prefixed with
//! [`RedisStoreConfig::key_prefix`] (default `gateway-throttle:`), which keeps
//! the engine's entries apart from other tenants of the same database.
//!
//! # Failure behavior
//!
//! Connectivity problems surface as [`StoreError::Unavailable`] (or
//! [`StoreError::Timeout`] when the client reports a timeout) and are handled
//! upstream by failing open. A value that no longer decodes is deleted and
//! reported as absent, so one corrupt entry costs a single window rather than
//! wedging the key forever.
//!
//! Requires the `redis-storage` feature:
//!
//! ```toml
//! [dependencies]
//! gateway-throttle = { version = "0.1", features = ["redis-storage"] }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

use crate::application::ports::{StoreError, WindowStore};
use crate::domain::RateLimitKey;

/// Configuration for [`RedisWindowStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Prefix prepended to every Redis key.
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        RedisStoreConfig {
            key_prefix: "gateway-throttle:".to_string(),
        }
    }
}

/// [`WindowStore`] that shares windows across processes through Redis.
///
/// The connection is a [`ConnectionManager`], which reconnects on its own
/// after transient failures; clones share it.
///
/// # Example
///
/// ```no_run
/// use gateway_throttle::RedisWindowStore;
///
/// # async fn example() -> Result<(), redis::RedisError> {
/// let store = RedisWindowStore::connect("redis://127.0.0.1/").await?;
/// # let _ = store;
/// # Ok(())
/// # }
/// ```
pub struct RedisWindowStore {
    connection: Arc<RwLock<ConnectionManager>>,
    config: RedisStoreConfig,
}

impl RedisWindowStore {
    /// Connects to Redis at `url` with the default configuration.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connects to Redis at `url` with a custom configuration.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(RedisWindowStore {
            connection: Arc::new(RwLock::new(manager)),
            config,
        })
    }

    /// Deletes every key carrying this store's prefix.
    ///
    /// Intended for tests and operational resets; live entries expire on
    /// their own through per-key TTLs.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let pattern = format!("{}*", self.config.key_prefix);
        let mut conn = self.connection.write().await;

        let mut cursor = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await
                .map_err(store_error)?;

            if !keys.is_empty() {
                let _: () = conn.del(&keys).await.map_err(store_error)?;
            }

            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }

    fn redis_key(&self, key: &RateLimitKey) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }
}

impl fmt::Debug for RedisWindowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisWindowStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Clone for RedisWindowStore {
    fn clone(&self) -> Self {
        RedisWindowStore {
            connection: Arc::clone(&self.connection),
            config: self.config.clone(),
        }
    }
}

fn store_error(error: RedisError) -> StoreError {
    if error.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Unavailable(error.to_string())
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn get(&self, key: &RateLimitKey) -> Result<Option<Vec<u64>>, StoreError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.connection.write().await;

        let bytes: Option<Vec<u8>> = conn.get(&redis_key).await.map_err(store_error)?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };

        match bincode::deserialize::<Vec<u64>>(&bytes) {
            Ok(window) => Ok(Some(window)),
            Err(error) => {
                tracing::warn!(
                    key = %redis_key,
                    error = %error,
                    "deleting window that no longer decodes"
                );
                let _: () = conn.del(&redis_key).await.map_err(store_error)?;
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        key: &RateLimitKey,
        window: Vec<u64>,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let bytes =
            bincode::serialize(&window).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let redis_key = self.redis_key(key);

        // SETEX rejects a zero expiry.
        let ttl = ttl_seconds.max(1);

        let mut conn = self.connection.write().await;
        conn.set_ex::<_, _, ()>(&redis_key, bytes, ttl)
            .await
            .map_err(store_error)
    }

    async fn delete(&self, key: &RateLimitKey) -> Result<(), StoreError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.connection.write().await;
        conn.del::<_, ()>(&redis_key).await.map_err(store_error)
    }
}
