//! Redis cache backend for Tenantry
//!
//! Implements [`tenantry_core::CacheProvider`] on top of a Redis
//! `ConnectionManager`, so a [`tenantry_core::TenantCache`] can share
//! cached tenants across processes.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenantry_core::TenantCache;
//! use tenantry_redis::{RedisCacheConfig, RedisCacheProvider};
//!
//! let provider = RedisCacheProvider::connect(RedisCacheConfig::from_env()?).await?;
//! let cache = TenantCache::new(Arc::new(provider)).with_default_ttl(Duration::from_secs(300));
//! ```

pub mod cache;
pub mod config;

pub use cache::RedisCacheProvider;
pub use config::{RedisCacheConfig, RedisCacheConfigBuilder};
