//! Tenantry - multi-tenant resolution and per-tenant connection pools
//!
//! Resolves a tenant name to its record through a cache-aside lookup, keeps
//! the resolved tenant in an explicit request context, and lazily opens one
//! connection pool per `(tenant, role)` for relational and document
//! databases.
//!
//! The core lives in [`tenantry_core`] and is always available. Backends and
//! adapters are behind features:
//!
//! | Feature | Crate | Provides |
//! |---------|-------|----------|
//! | `redis` | `tenantry-redis` | Redis cache backend |
//! | `postgres` | `tenantry-postgres` | PostgreSQL store and relational pools |
//! | `mongodb` | `tenantry-mongodb` | MongoDB store and document pools |
//! | `http` | `tenantry-http` | Header-based HTTP middleware |
//! | `cli` | `tenantry-cli` | Env/argument resolution and polling worker |
//! | `full` | all of the above | [`Tenantry::connect`] |
//!
//! ```rust,ignore
//! use tenantry::prelude::*;
//!
//! let client = Tenantry::connect(TenantryConfig::from_env()?).await?;
//! let ctx = TenantContext::background();
//!
//! let acme = client.service().get_tenant(&ctx, "acme").await?;
//! let ctx = ctx.with_tenant(acme);
//! let pool = client.connections().relational_pool_for_context(&ctx, DatasourceRole::Read).await?;
//!
//! client.close().await?;
//! ```

pub mod client;

pub use client::{Tenantry, with_retry};
pub use tenantry_core::*;

#[cfg(feature = "redis")]
pub use tenantry_redis;

#[cfg(feature = "postgres")]
pub use tenantry_postgres;

#[cfg(feature = "mongodb")]
pub use tenantry_mongodb;

#[cfg(feature = "http")]
pub use tenantry_http;

#[cfg(feature = "cli")]
pub use tenantry_cli;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::Tenantry;
    pub use tenantry_core::prelude::*;

    #[cfg(feature = "http")]
    pub use tenantry_http::{TenantMiddleware, TenantMiddlewareConfig};

    #[cfg(feature = "cli")]
    pub use tenantry_cli::{TenantResolver, Worker, WorkerConfig};
}
