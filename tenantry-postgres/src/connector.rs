//! Relational pool connector.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tenantry_core::{PoolConnector, PoolSettings, TenantError};
use tracing::debug;

/// Opens one `sqlx` pool per tenant datasource.
///
/// sqlx has no background health checker; connections are instead tested
/// before every acquire.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    acquire_timeout: Duration,
}

impl PostgresConnector {
    pub fn new() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Bound how long a caller waits for a free connection.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn pool_options(&self, settings: &PoolSettings) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(settings.max_size)
            .min_connections(settings.min_size.min(settings.max_size))
            .idle_timeout(settings.max_idle_time)
            .max_lifetime(settings.max_lifetime)
            .acquire_timeout(self.acquire_timeout)
            .test_before_acquire(true)
    }
}

impl Default for PostgresConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolConnector for PostgresConnector {
    type Pool = PgPool;

    fn family(&self) -> &'static str {
        "relational"
    }

    async fn open(&self, dsn: &str, settings: &PoolSettings) -> Result<PgPool, TenantError> {
        // Parse errors can echo the DSN back, so they are not forwarded.
        let options = PgConnectOptions::from_str(dsn)
            .map_err(|_| TenantError::Connection("invalid PostgreSQL connection string".to_string()))?;

        let pool = self
            .pool_options(settings)
            .connect_with(options)
            .await
            .map_err(|e| TenantError::Connection(format!("failed to open PostgreSQL pool: {}", e)))?;

        if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
            pool.close().await;
            return Err(TenantError::Connection(format!("PostgreSQL ping failed: {}", e)));
        }

        debug!(max_size = settings.max_size, "PostgreSQL pool opened");
        Ok(pool)
    }

    async fn close(&self, pool: &PgPool) -> Result<(), TenantError> {
        pool.close().await;
        Ok(())
    }
}
