//! MongoDB backends for Tenantry
//!
//! - [`MongoTenantStore`] keeps one document per tenant with its
//!   datasources embedded.
//! - [`MongoConnector`] opens the per-tenant document clients handed out
//!   by [`tenantry_core::ConnectionManager`].

pub mod connector;
pub mod store;

pub use connector::MongoConnector;
pub use store::{COLLECTION, DEFAULT_DATABASE, MongoTenantStore};
