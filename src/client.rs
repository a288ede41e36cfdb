//! Wiring of store, cache, service and pool manager.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tenantry_core::{ConnectionManager, PoolConnector, TenantCache, TenantError, TenantService, TenantStore, TenantryConfig};
use tracing::{info, warn};

#[cfg(all(feature = "postgres", feature = "mongodb", feature = "redis"))]
use tenantry_core::DatabaseType;
#[cfg(all(feature = "postgres", feature = "mongodb", feature = "redis"))]
use tenantry_mongodb::{MongoConnector, MongoTenantStore};
#[cfg(all(feature = "postgres", feature = "mongodb", feature = "redis"))]
use tenantry_postgres::{PostgresConnector, PostgresTenantStore};
#[cfg(all(feature = "postgres", feature = "mongodb", feature = "redis"))]
use tenantry_redis::{RedisCacheConfig, RedisCacheProvider};

/// Entry point holding every tenant-facing component
///
/// `R` opens relational pools and `D` document pools.
pub struct Tenantry<R: PoolConnector, D: PoolConnector> {
    config: TenantryConfig,
    service: Arc<TenantService>,
    connections: Arc<ConnectionManager<R, D>>,
}

impl<R: PoolConnector, D: PoolConnector> Tenantry<R, D> {
    /// Assemble a client from already-connected parts.
    ///
    /// Pool defaults come from `config`; the cache is used as given.
    pub fn from_parts(
        config: TenantryConfig,
        store: Arc<dyn TenantStore>,
        cache: TenantCache,
        relational: R,
        document: D,
    ) -> Self {
        let service = Arc::new(TenantService::new(store, cache));
        let connections = Arc::new(
            ConnectionManager::new(service.clone(), relational, document).with_defaults(config.pool_settings()),
        );

        Self {
            config,
            service,
            connections,
        }
    }

    pub fn config(&self) -> &TenantryConfig {
        &self.config
    }

    /// Tenant resolution service
    pub fn service(&self) -> &Arc<TenantService> {
        &self.service
    }

    /// Per-tenant pool manager
    pub fn connections(&self) -> &Arc<ConnectionManager<R, D>> {
        &self.connections
    }

    /// Resolver for command-line tools and workers.
    #[cfg(feature = "cli")]
    pub fn resolver(&self) -> tenantry_cli::TenantResolver {
        tenantry_cli::TenantResolver::new(self.service.clone())
    }

    /// HTTP middleware using the configured header and ignored endpoints.
    #[cfg(feature = "http")]
    pub fn http_middleware(&self) -> tenantry_http::TenantMiddleware {
        tenantry_http::TenantMiddleware::new(
            self.service.clone(),
            tenantry_http::TenantMiddlewareConfig::from_config(&self.config),
        )
    }

    /// Close every open pool.
    pub async fn close(&self) -> Result<(), TenantError> {
        self.connections.close_all().await
    }
}

#[cfg(all(feature = "postgres", feature = "mongodb", feature = "redis"))]
impl Tenantry<PostgresConnector, MongoConnector> {
    /// Validate `config`, connect the tenant store and the Redis cache, and
    /// wire everything together.
    ///
    /// Store and cache connections are retried `max_retries` times,
    /// `retry_delay` apart.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tenantry::{Tenantry, TenantryConfig};
    ///
    /// # async fn example() -> Result<(), tenantry::TenantError> {
    /// let config = TenantryConfig::builder()
    ///     .postgres("postgres://localhost/tenants")
    ///     .redis("redis://localhost:6379")
    ///     .build()?;
    /// let client = Tenantry::connect(config).await?;
    /// client.close().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: TenantryConfig) -> Result<Self, TenantError> {
        config.validate()?;
        let (retries, delay) = (config.max_retries, config.retry_delay);
        let dsn = config.database_dsn.as_str();
        let redis_url = config.redis_url.as_str();

        let store: Arc<dyn TenantStore> = match config.database_type {
            DatabaseType::Postgres => Arc::new(
                with_retry("tenant store", retries, delay, move || PostgresTenantStore::connect(dsn)).await?,
            ),
            DatabaseType::Mongodb => Arc::new(
                with_retry("tenant store", retries, delay, move || MongoTenantStore::connect(dsn)).await?,
            ),
        };

        let provider = with_retry("tenant cache", retries, delay, move || async move {
            RedisCacheProvider::connect(RedisCacheConfig::new(redis_url))
                .await
                .map_err(TenantError::from)
        })
        .await?;
        let cache = TenantCache::new(Arc::new(provider)).with_default_ttl(config.cache_ttl);

        info!(
            database = %config.database_type,
            cache_ttl = ?config.cache_ttl,
            pool_size = config.pool_size,
            "tenantry client ready"
        );
        Ok(Self::from_parts(config, store, cache, PostgresConnector::new(), MongoConnector::new()))
    }
}

/// Run `op`, retrying infrastructure failures up to `max_retries` times.
///
/// Other errors are returned at once.
pub async fn with_retry<T, F, Fut>(what: &str, max_retries: u32, delay: Duration, mut op: F) -> Result<T, TenantError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TenantError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_infrastructure() && attempt < max_retries => {
                attempt += 1;
                warn!(component = what, attempt, max_retries, error = %e, "connection failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
