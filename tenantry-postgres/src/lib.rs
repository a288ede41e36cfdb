//! PostgreSQL backends for Tenantry
//!
//! - [`PostgresTenantStore`] keeps tenants and their datasources in two
//!   tables and bootstraps them on connect.
//! - [`PostgresConnector`] opens the per-tenant relational pools handed out
//!   by [`tenantry_core::ConnectionManager`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenantry_postgres::{PostgresConnector, PostgresTenantStore};
//!
//! let store = Arc::new(PostgresTenantStore::connect("postgres://localhost/tenantry").await?);
//! let service = Arc::new(TenantService::new(store, cache));
//! let manager = ConnectionManager::new(service, PostgresConnector::new(), document_connector);
//! ```

pub mod connector;
pub mod store;

pub use connector::PostgresConnector;
pub use store::{PostgresStoreConfig, PostgresTenantStore, SCHEMA};
