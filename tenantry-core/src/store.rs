//! Persistent tenant storage contract

use crate::error::TenantError;
use crate::tenant::Tenant;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Tenant store trait (implement with your database)
///
/// Stores own name uniqueness and the tenant/datasource relationship.
/// Inactive tenants are returned like any other record.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find tenant by name
    async fn find_by_name(&self, name: &str) -> Result<Option<Tenant>, TenantError>;

    /// List all tenants, ordered by name
    async fn list(&self) -> Result<Vec<Tenant>, TenantError>;

    /// Insert a new tenant. A duplicate name or id is `Conflict`.
    async fn create(&self, tenant: &Tenant) -> Result<(), TenantError>;

    /// Replace a tenant's mutable fields and datasource list
    async fn update(&self, tenant: &Tenant) -> Result<(), TenantError>;

    /// Delete a tenant and its datasources by id
    async fn delete(&self, id: &str) -> Result<(), TenantError>;
}

/// In-memory tenant store
///
/// Keyed by tenant id. Useful for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<HashMap<String, Tenant>>,
}

impl InMemoryTenantStore {
    /// Create new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Tenant>, TenantError> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Tenant>, TenantError> {
        let mut tenants: Vec<Tenant> = self.tenants.read().values().cloned().collect();
        tenants.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tenants)
    }

    async fn create(&self, tenant: &Tenant) -> Result<(), TenantError> {
        tenant.validate()?;

        let mut tenants = self.tenants.write();
        if tenants.contains_key(&tenant.id) || tenants.values().any(|t| t.name == tenant.name) {
            return Err(TenantError::Conflict(tenant.name.clone()));
        }
        tenants.insert(tenant.id.clone(), tenant.clone());
        Ok(())
    }

    async fn update(&self, tenant: &Tenant) -> Result<(), TenantError> {
        tenant.validate()?;

        let mut tenants = self.tenants.write();
        let created_at = match tenants.get(&tenant.id) {
            Some(existing) => existing.created_at,
            None => return Err(TenantError::NotFound(tenant.id.clone())),
        };
        if tenants
            .values()
            .any(|t| t.id != tenant.id && t.name == tenant.name)
        {
            return Err(TenantError::Conflict(tenant.name.clone()));
        }

        let mut stored = tenant.clone();
        stored.created_at = created_at;
        tenants.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), TenantError> {
        match self.tenants.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(TenantError::NotFound(id.to_string())),
        }
    }
}
