//! Per-tenant connection pools
//!
//! Pools are keyed by `(tenant name, role)` and live in one registry per
//! backend family. A registry is a `HashMap` behind a reader/writer lock:
//! lookups of existing pools share the read lock, creation and teardown
//! take the write lock.
//!
//! Opening a pool is delegated to a [`PoolConnector`], which wraps the
//! driver's own pool type. Connectors verify connectivity before handing
//! a pool back and tear it down themselves when verification fails.
//!
//! ```rust,ignore
//! let manager = ConnectionManager::new(service, PostgresConnector, MongoConnector);
//!
//! let pg = manager.relational_pool(&ctx, "acme", DatasourceRole::Read).await?;
//! let mongo = manager.document_pool_for_context(&ctx, DatasourceRole::Write).await?;
//!
//! manager.close_all().await?;
//! ```

use crate::context::TenantContext;
use crate::error::TenantError;
use crate::service::TenantService;
use crate::tenant::{Datasource, DatasourceRole, Tenant};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Pool sizing and lifetime limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum open connections
    pub max_size: u32,

    /// Connections kept open while idle
    pub min_size: u32,

    /// Close connections idle for longer than this
    #[serde(with = "humantime_serde")]
    pub max_idle_time: Duration,

    /// Recycle connections older than this
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,

    /// Interval between liveness checks
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_size: 2,
            max_idle_time: Duration::from_secs(5 * 60),
            max_lifetime: Duration::from_secs(60 * 60),
            health_check_interval: Duration::from_secs(60),
        }
    }
}

impl PoolSettings {
    /// Settings for a pool opened from `datasource`.
    ///
    /// Only the maximum size comes from the datasource; everything else
    /// keeps the process-wide defaults.
    pub fn for_datasource(&self, datasource: &Datasource) -> Self {
        let max_size = if datasource.pool_size > 0 {
            datasource.pool_size
        } else {
            self.max_size
        };
        Self {
            max_size,
            ..self.clone()
        }
    }
}

/// Opens and closes driver pools for one backend family
#[async_trait]
pub trait PoolConnector: Send + Sync + 'static {
    /// The driver's pool handle (e.g. `sqlx::PgPool`, `mongodb::Client`)
    type Pool: Send + Sync + 'static;

    /// Family name used in logs ("relational", "document")
    fn family(&self) -> &'static str;

    /// Open a pool against `dsn` and verify it is reachable.
    ///
    /// On verification failure the connector must release whatever it
    /// opened before returning the error.
    async fn open(&self, dsn: &str, settings: &PoolSettings) -> Result<Self::Pool, TenantError>;

    /// Close a pool
    async fn close(&self, pool: &Self::Pool) -> Result<(), TenantError>;
}

/// Registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pub tenant: String,
    pub role: DatasourceRole,
}

impl PoolKey {
    pub fn new(tenant: impl Into<String>, role: DatasourceRole) -> Self {
        Self {
            tenant: tenant.into(),
            role,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.role)
    }
}

/// Pools of one backend family
pub struct PoolRegistry<C: PoolConnector> {
    connector: C,
    pools: RwLock<HashMap<PoolKey, Arc<C::Pool>>>,
}

impl<C: PoolConnector> PoolRegistry<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Registered pool for `key`, if any
    pub async fn get(&self, key: &PoolKey) -> Option<Arc<C::Pool>> {
        self.pools.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.pools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pools.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<PoolKey> {
        let mut keys: Vec<PoolKey> = self.pools.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Open a pool for `tenant` and register it under `key`.
    ///
    /// If another caller registered `key` while this one was opening, the
    /// fresh pool is closed and the registered one returned.
    async fn open(
        &self,
        ctx: &TenantContext,
        key: PoolKey,
        tenant: &Tenant,
        defaults: &PoolSettings,
    ) -> Result<Arc<C::Pool>, TenantError> {
        let datasource = tenant
            .datasource_for(key.role)
            .ok_or_else(|| TenantError::NoDatasource {
                tenant: key.tenant.clone(),
                role: key.role,
            })?;
        let settings = defaults.for_datasource(datasource);

        debug!(
            tenant = %key.tenant,
            role = %key.role,
            family = self.connector.family(),
            datasource = %datasource.id,
            "opening connection pool"
        );
        let pool = ctx
            .run(self.connector.open(&datasource.dsn, &settings))
            .await?;

        if ctx.is_cancelled() {
            self.close_quietly(&key, &pool).await;
            return Err(TenantError::Cancelled);
        }

        let pool = Arc::new(pool);
        let existing = {
            let mut pools = self.pools.write().await;
            match pools.get(&key) {
                Some(existing) => Some(Arc::clone(existing)),
                None => {
                    pools.insert(key.clone(), Arc::clone(&pool));
                    None
                }
            }
        };

        if let Some(existing) = existing {
            debug!(tenant = %key.tenant, role = %key.role, "pool already registered, closing duplicate");
            self.close_quietly(&key, &pool).await;
            return Ok(existing);
        }

        info!(
            tenant = %key.tenant,
            role = %key.role,
            family = self.connector.family(),
            max_size = settings.max_size,
            "connection pool created"
        );
        Ok(pool)
    }

    async fn close_quietly(&self, key: &PoolKey, pool: &C::Pool) {
        if let Err(e) = self.connector.close(pool).await {
            warn!(pool = %key, family = self.connector.family(), error = %e, "failed to close pool");
        }
    }

    /// Close every pool in `pools`, collecting failures
    async fn close_each(&self, pools: Vec<(PoolKey, Arc<C::Pool>)>, failures: &mut Vec<String>) {
        for (key, pool) in pools {
            match self.connector.close(&pool).await {
                Ok(()) => debug!(pool = %key, family = self.connector.family(), "pool closed"),
                Err(e) => {
                    warn!(pool = %key, family = self.connector.family(), error = %e, "failed to close pool");
                    failures.push(format!("{} {}: {}", self.connector.family(), key, e));
                }
            }
        }
    }
}

/// Connection pool manager
///
/// Owns one registry per backend family. Pools are created lazily on the
/// first request for a `(tenant, role)` pair and live until [`close_all`]
/// or [`invalidate_tenant`].
///
/// [`close_all`]: ConnectionManager::close_all
/// [`invalidate_tenant`]: ConnectionManager::invalidate_tenant
pub struct ConnectionManager<R: PoolConnector, D: PoolConnector> {
    service: Arc<TenantService>,
    relational: PoolRegistry<R>,
    document: PoolRegistry<D>,
    defaults: PoolSettings,
}

impl<R: PoolConnector, D: PoolConnector> ConnectionManager<R, D> {
    /// Create a manager with default pool settings
    pub fn new(service: Arc<TenantService>, relational: R, document: D) -> Self {
        Self {
            service,
            relational: PoolRegistry::new(relational),
            document: PoolRegistry::new(document),
            defaults: PoolSettings::default(),
        }
    }

    /// Set the process-wide pool defaults
    pub fn with_defaults(mut self, defaults: PoolSettings) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &PoolSettings {
        &self.defaults
    }

    pub fn service(&self) -> &Arc<TenantService> {
        &self.service
    }

    pub fn relational(&self) -> &PoolRegistry<R> {
        &self.relational
    }

    pub fn document(&self) -> &PoolRegistry<D> {
        &self.document
    }

    /// Get or create the relational pool for `tenant` and `role`
    pub async fn relational_pool(
        &self,
        ctx: &TenantContext,
        tenant: &str,
        role: DatasourceRole,
    ) -> Result<Arc<R::Pool>, TenantError> {
        self.pool_by_name(&self.relational, ctx, tenant, role).await
    }

    /// Get or create the document pool for `tenant` and `role`
    pub async fn document_pool(
        &self,
        ctx: &TenantContext,
        tenant: &str,
        role: DatasourceRole,
    ) -> Result<Arc<D::Pool>, TenantError> {
        self.pool_by_name(&self.document, ctx, tenant, role).await
    }

    /// Relational pool for the tenant attached to `ctx`
    pub async fn relational_pool_for_context(
        &self,
        ctx: &TenantContext,
        role: DatasourceRole,
    ) -> Result<Arc<R::Pool>, TenantError> {
        self.pool_for_context(&self.relational, ctx, role).await
    }

    /// Document pool for the tenant attached to `ctx`
    pub async fn document_pool_for_context(
        &self,
        ctx: &TenantContext,
        role: DatasourceRole,
    ) -> Result<Arc<D::Pool>, TenantError> {
        self.pool_for_context(&self.document, ctx, role).await
    }

    async fn pool_by_name<C: PoolConnector>(
        &self,
        registry: &PoolRegistry<C>,
        ctx: &TenantContext,
        name: &str,
        role: DatasourceRole,
    ) -> Result<Arc<C::Pool>, TenantError> {
        let key = PoolKey::new(name, role);
        if let Some(pool) = registry.get(&key).await {
            return Ok(pool);
        }

        let tenant = self.service.get_tenant(ctx, name).await?;
        registry.open(ctx, key, &tenant, &self.defaults).await
    }

    async fn pool_for_context<C: PoolConnector>(
        &self,
        registry: &PoolRegistry<C>,
        ctx: &TenantContext,
        role: DatasourceRole,
    ) -> Result<Arc<C::Pool>, TenantError> {
        let tenant = ctx.validate()?;
        let key = PoolKey::new(tenant.name.as_str(), role);
        if let Some(pool) = registry.get(&key).await {
            return Ok(pool);
        }

        registry.open(ctx, key, tenant, &self.defaults).await
    }

    /// Close every pool in both families and empty the registries.
    ///
    /// Both write locks are held for the whole teardown. A failed close
    /// does not stop the remaining ones; failures are reported together.
    pub async fn close_all(&self) -> Result<(), TenantError> {
        let mut relational = self.relational.pools.write().await;
        let mut document = self.document.pools.write().await;

        let count = relational.len() + document.len();
        let mut failures = Vec::new();
        self.relational
            .close_each(relational.drain().collect(), &mut failures)
            .await;
        self.document
            .close_each(document.drain().collect(), &mut failures)
            .await;

        info!(pools = count, failed = failures.len(), "connection pools closed");
        close_result(failures)
    }

    /// Close and forget every pool belonging to `tenant`.
    ///
    /// Use after changing a tenant's datasources; the next request opens
    /// fresh pools from the updated configuration.
    pub async fn invalidate_tenant(&self, tenant: &str) -> Result<(), TenantError> {
        let mut relational = self.relational.pools.write().await;
        let mut document = self.document.pools.write().await;

        let mut failures = Vec::new();
        self.relational
            .close_each(take_tenant(&mut relational, tenant), &mut failures)
            .await;
        self.document
            .close_each(take_tenant(&mut document, tenant), &mut failures)
            .await;

        debug!(tenant, "tenant pools invalidated");
        close_result(failures)
    }

    /// Number of registered pools across both families
    pub async fn pool_count(&self) -> usize {
        self.relational.len().await + self.document.len().await
    }

    /// Registered keys as `(family, key)`, sorted within each family
    pub async fn registered_keys(&self) -> Vec<(&'static str, PoolKey)> {
        let relational = self.relational.connector.family();
        let document = self.document.connector.family();

        let mut keys: Vec<(&'static str, PoolKey)> = self
            .relational
            .keys()
            .await
            .into_iter()
            .map(|key| (relational, key))
            .collect();
        keys.extend(self.document.keys().await.into_iter().map(|key| (document, key)));
        keys
    }
}

fn take_tenant<P>(pools: &mut HashMap<PoolKey, Arc<P>>, tenant: &str) -> Vec<(PoolKey, Arc<P>)> {
    let keys: Vec<PoolKey> = pools.keys().filter(|k| k.tenant == tenant).cloned().collect();
    keys.into_iter()
        .filter_map(|key| pools.remove(&key).map(|pool| (key, pool)))
        .collect()
}

fn close_result(failures: Vec<String>) -> Result<(), TenantError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(TenantError::Connection(format!(
            "failed to close {} pool(s): {}",
            failures.len(),
            failures.join("; ")
        )))
    }
}
