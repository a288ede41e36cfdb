//! Tenant resolution service
//!
//! Reads go cache first, then store, and populate the cache on a store hit.
//! Mutations go to the store and are written through to the cache.

use crate::cache::TenantCache;
use crate::context::TenantContext;
use crate::error::TenantError;
use crate::store::TenantStore;
use crate::tenant::Tenant;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves tenants by name and applies tenant mutations
pub struct TenantService {
    store: Arc<dyn TenantStore>,
    cache: TenantCache,
}

impl TenantService {
    /// Create a service over a store and a cache
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tenantry_core::{InMemoryTenantStore, MemoryCacheProvider, TenantCache, TenantService};
    ///
    /// let store = Arc::new(InMemoryTenantStore::new());
    /// let cache = TenantCache::new(Arc::new(MemoryCacheProvider::new()));
    /// let service = TenantService::new(store, cache);
    /// ```
    pub fn new(store: Arc<dyn TenantStore>, cache: TenantCache) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &TenantCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Resolve an active tenant by name.
    ///
    /// A cache hit is returned without consulting the store. A cache
    /// failure on lookup or on populate is logged and does not fail the call.
    pub async fn get_tenant(&self, ctx: &TenantContext, name: &str) -> Result<Tenant, TenantError> {
        let lookup = ctx
            .run(async { Ok::<_, TenantError>(self.cache.get(name).await) })
            .await?;
        let cached = match lookup {
            Ok(cached) => cached,
            Err(e) => {
                warn!(tenant = name, error = %e, "tenant cache lookup failed, reading store");
                None
            }
        };

        let tenant = match cached {
            Some(tenant) => {
                debug!(tenant = name, "tenant cache hit");
                tenant
            }
            None => {
                let tenant = ctx
                    .run(self.store.find_by_name(name))
                    .await?
                    .ok_or_else(|| TenantError::NotFound(name.to_string()))?;

                let populate = ctx
                    .run(async { Ok::<_, TenantError>(self.cache.set(&tenant, None).await) })
                    .await?;
                if let Err(e) = populate {
                    warn!(tenant = name, error = %e, "failed to populate tenant cache");
                }
                tenant
            }
        };

        if !tenant.is_active {
            return Err(TenantError::Inactive(tenant.name));
        }
        Ok(tenant)
    }

    /// List every tenant from the store, bypassing the cache
    pub async fn list_tenants(&self, ctx: &TenantContext) -> Result<Vec<Tenant>, TenantError> {
        ctx.run(self.store.list()).await
    }

    /// Validate, persist and cache a new tenant
    pub async fn create_tenant(&self, ctx: &TenantContext, mut tenant: Tenant) -> Result<Tenant, TenantError> {
        tenant.validate()?;

        let now = Utc::now();
        tenant.created_at = now;
        tenant.updated_at = now;
        for datasource in &mut tenant.datasources {
            datasource.created_at = now;
            datasource.updated_at = now;
        }

        ctx.run(self.store.create(&tenant)).await?;
        ctx.run(async { self.cache.set(&tenant, None).await.map_err(TenantError::from) })
            .await?;

        debug!(tenant = %tenant.name, id = %tenant.id, "tenant created");
        Ok(tenant)
    }

    /// Validate, persist and cache a full replacement of a tenant.
    ///
    /// Creation timestamps come from the stored record, for the tenant and
    /// for every datasource that already existed. A renamed tenant's old
    /// cache entry is dropped.
    pub async fn update_tenant(&self, ctx: &TenantContext, mut tenant: Tenant) -> Result<Tenant, TenantError> {
        tenant.validate()?;

        let current = self
            .list_tenants(ctx)
            .await?
            .into_iter()
            .find(|t| t.id == tenant.id)
            .ok_or_else(|| TenantError::NotFound(tenant.name.clone()))?;

        let now = Utc::now();
        tenant.created_at = current.created_at;
        tenant.updated_at = now;
        for datasource in &mut tenant.datasources {
            datasource.created_at = current
                .datasources
                .iter()
                .find(|existing| existing.id == datasource.id)
                .map_or(now, |existing| existing.created_at);
            datasource.updated_at = now;
        }

        ctx.run(self.store.update(&tenant)).await?;
        if current.name != tenant.name {
            ctx.run(async { self.cache.delete(&current.name).await.map_err(TenantError::from) })
                .await?;
        }
        ctx.run(async { self.cache.set(&tenant, None).await.map_err(TenantError::from) })
            .await?;

        debug!(tenant = %tenant.name, id = %tenant.id, "tenant updated");
        Ok(tenant)
    }

    /// Delete a tenant by id and drop its cache entry.
    ///
    /// The cache is keyed by name, so the name is looked up first. If the
    /// tenant is already gone the store delete still runs but nothing can
    /// be invalidated.
    pub async fn delete_tenant(&self, ctx: &TenantContext, id: &str) -> Result<(), TenantError> {
        let name = self
            .list_tenants(ctx)
            .await?
            .into_iter()
            .find(|t| t.id == id)
            .map(|t| t.name);

        ctx.run(self.store.delete(id)).await?;

        match name {
            Some(name) => {
                ctx.run(async { self.cache.delete(&name).await.map_err(TenantError::from) })
                    .await?;
                debug!(tenant = %name, id, "tenant deleted");
            }
            None => debug!(id, "tenant deleted without a known name, cache not invalidated"),
        }
        Ok(())
    }
}
