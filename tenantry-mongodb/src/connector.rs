//! Document pool connector.

use async_trait::async_trait;
use mongodb::Client;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use std::time::Duration;
use tenantry_core::{PoolConnector, PoolSettings, TenantError};
use tracing::debug;

/// Smallest heartbeat interval the driver accepts.
const MIN_HEARTBEAT: Duration = Duration::from_millis(500);

/// Opens one MongoDB client, with its own connection pool, per tenant
/// datasource. The driver has no maximum connection lifetime, so
/// `max_lifetime` is not applied.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    server_selection_timeout: Duration,
}

impl MongoConnector {
    pub fn new() -> Self {
        Self {
            server_selection_timeout: Duration::from_secs(10),
        }
    }

    /// Bound how long the ping waits for a reachable server.
    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = timeout;
        self
    }

    fn apply(&self, options: &mut ClientOptions, settings: &PoolSettings) {
        options.max_pool_size = Some(settings.max_size);
        options.min_pool_size = Some(settings.min_size.min(settings.max_size));
        options.max_idle_time = Some(settings.max_idle_time);
        options.heartbeat_freq = Some(settings.health_check_interval.max(MIN_HEARTBEAT));
        options.server_selection_timeout = Some(self.server_selection_timeout);
    }
}

impl Default for MongoConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolConnector for MongoConnector {
    type Pool = Client;

    fn family(&self) -> &'static str {
        "document"
    }

    async fn open(&self, dsn: &str, settings: &PoolSettings) -> Result<Client, TenantError> {
        // Parse errors can echo the DSN back, so they are not forwarded.
        let mut options = ClientOptions::parse(dsn)
            .await
            .map_err(|_| TenantError::Connection("invalid MongoDB connection string".to_string()))?;
        self.apply(&mut options, settings);

        let client = Client::with_options(options)
            .map_err(|e| TenantError::Connection(format!("failed to create MongoDB client: {}", e)))?;

        if let Err(e) = client.database("admin").run_command(doc! { "ping": 1 }).await {
            client.shutdown().await;
            return Err(TenantError::Connection(format!("MongoDB ping failed: {}", e)));
        }

        debug!(max_size = settings.max_size, "MongoDB client opened");
        Ok(client)
    }

    async fn close(&self, pool: &Client) -> Result<(), TenantError> {
        pool.clone().shutdown().await;
        Ok(())
    }
}
