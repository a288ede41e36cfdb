//! Redis cache backend.

use crate::config::RedisCacheConfig;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::future::Future;
use std::time::Duration;
use tenantry_core::{CacheError, CacheProvider};
use tracing::{debug, info};

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 100;

/// Redis cache backend.
///
/// Values are stored as raw bytes with a per-key expiry (`PSETEX`). Every
/// command is bounded by the configured command timeout.
#[derive(Clone)]
pub struct RedisCacheProvider {
    connection: ConnectionManager,
    command_timeout: Duration,
}

impl RedisCacheProvider {
    /// Connect and verify the server answers `PING`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use tenantry_core::TenantCache;
    /// use tenantry_redis::{RedisCacheConfig, RedisCacheProvider};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), tenantry_core::CacheError> {
    ///     let provider = RedisCacheProvider::connect(RedisCacheConfig::new("redis://localhost:6379")).await?;
    ///     let cache = TenantCache::new(Arc::new(provider));
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: RedisCacheConfig) -> Result<Self, CacheError> {
        let client =
            Client::open(config.connection_url()?).map_err(|e| CacheError::Connection(e.to_string()))?;

        let connection = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(map_error)?;

        let provider = Self {
            connection,
            command_timeout: config.command_timeout,
        };
        provider.ping().await?;

        info!(url = %config.redacted_url(), "Redis cache connected");
        Ok(provider)
    }

    /// Send `PING`.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    /// Get the underlying connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(map_error)
    }
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection.clone();
        self.bounded(async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        // PSETEX rejects a zero expiry
        let millis = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        let mut conn = self.connection.clone();
        self.bounded(async move { conn.pset_ex(key, value, millis).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        self.bounded(async move { conn.del(key).await }).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let mut conn = self.connection.clone();
            let (next, keys): (u64, Vec<String>) = self
                .bounded(async {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let removed: u64 = self.bounded(async { conn.del(&keys).await }).await?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!(prefix, deleted, "cache prefix cleared");
        Ok(deleted)
    }
}

fn map_error(e: redis::RedisError) -> CacheError {
    if e.is_timeout() {
        CacheError::Timeout
    } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        CacheError::Connection(e.to_string())
    } else {
        CacheError::Backend(e.to_string())
    }
}
