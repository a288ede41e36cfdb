//! Tenant resolution and per-tenant connection pools
//!
//! Core building blocks for multi-tenant services: tenant records with
//! their datasources, a cache-aside resolution service over a pluggable
//! store, and a manager that lazily opens one connection pool per
//! `(tenant, role)`.
//!
//! # Features
//!
//! - **Tenant model** - Tenants own an ordered list of datasources (`read`, `write`, `rw`)
//! - **Cache-aside resolution** - Cache first, store on miss, write-through on mutation
//! - **Pool manager** - One pool per tenant and role, for relational and document backends
//! - **Request context** - Immutable tenant context with deadlines and cancellation
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tenantry_core::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(InMemoryTenantStore::new());
//! let cache = TenantCache::new(Arc::new(MemoryCacheProvider::new()));
//! let service = TenantService::new(store, cache);
//! let ctx = TenantContext::background();
//!
//! let tenant = Tenant::new("acme").with_datasource("postgres://db/acme", DatasourceRole::ReadWrite, 5);
//! service.create_tenant(&ctx, tenant).await.unwrap();
//!
//! let acme = service.get_tenant(&ctx, "acme").await.unwrap();
//! let ctx = ctx.with_tenant(acme);
//! assert_eq!(ctx.tenant_name(), Some("acme"));
//! # });
//! ```
//!
//! ## Backends
//!
//! Implement [`TenantStore`] for the tenant database, [`CacheProvider`] for
//! the cache and [`PoolConnector`] for each pool family:
//!
//! ```rust,ignore
//! #[async_trait]
//! impl PoolConnector for MyConnector {
//!     type Pool = MyPool;
//!
//!     fn family(&self) -> &'static str {
//!         "relational"
//!     }
//!
//!     async fn open(&self, dsn: &str, settings: &PoolSettings) -> Result<MyPool, TenantError> {
//!         MyPool::connect(dsn, settings.max_size).await
//!     }
//!
//!     async fn close(&self, pool: &MyPool) -> Result<(), TenantError> {
//!         pool.close().await
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod pool;
pub mod service;
pub mod store;
pub mod tenant;

pub use cache::{
    CacheError, CacheProvider, DEFAULT_CACHE_TTL, DEFAULT_KEY_PREFIX, MemoryCacheProvider,
    TenantCache,
};
pub use config::{DEFAULT_HEADER_NAME, DatabaseType, TenantryConfig, TenantryConfigBuilder};
pub use context::{TenantContext, execute_with_tenant};
pub use error::{ErrorCode, Result, TenantError};
pub use pool::{ConnectionManager, PoolConnector, PoolKey, PoolRegistry, PoolSettings};
pub use service::TenantService;
pub use store::{InMemoryTenantStore, TenantStore};
pub use tenant::{Datasource, DatasourceRole, Tenant};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheProvider, MemoryCacheProvider, TenantCache};
    pub use crate::config::TenantryConfig;
    pub use crate::context::TenantContext;
    pub use crate::error::TenantError;
    pub use crate::pool::{ConnectionManager, PoolConnector, PoolSettings};
    pub use crate::service::TenantService;
    pub use crate::store::{InMemoryTenantStore, TenantStore};
    pub use crate::tenant::{Datasource, DatasourceRole, Tenant};
}
