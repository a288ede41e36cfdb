//! Tenant Caching
//!
//! Cache-aside storage of tenant records keyed by tenant name. The backend
//! only sees opaque bytes under a namespaced key.

use crate::context::instant_after;
use crate::tenant::Tenant;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default lifetime of a cached tenant.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Key namespace for cached tenants.
pub const DEFAULT_KEY_PREFIX: &str = "tenantry:tenants:";

/// Cache backend trait
///
/// Implemented by key-value stores with per-key expiry (Redis, in-memory, ...).
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Get value from cache. A missing or expired key is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Set value with an expiry
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Delete value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key starting with `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Cache error: {0}")]
    Backend(String),
}

/// Tenant cache over an injected backend
#[derive(Clone)]
pub struct TenantCache {
    provider: Arc<dyn CacheProvider>,
    default_ttl: Duration,
    prefix: String,
}

impl TenantCache {
    /// Create a tenant cache with the default TTL and key prefix
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tenantry_core::{MemoryCacheProvider, TenantCache};
    ///
    /// let cache = TenantCache::new(Arc::new(MemoryCacheProvider::new()));
    /// assert_eq!(cache.key("acme"), "tenantry:tenants:acme");
    /// ```
    pub fn new(provider: Arc<dyn CacheProvider>) -> Self {
        Self {
            provider,
            default_ttl: DEFAULT_CACHE_TTL,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Set the TTL used when `set` is given none. A zero value keeps the current default.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        if !ttl.is_zero() {
            self.default_ttl = ttl;
        }
        self
    }

    /// Set the key namespace
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// TTL applied when none is given
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Backend key for a tenant name
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a cached tenant. `Ok(None)` is a miss; `Err` is a backend failure.
    pub async fn get(&self, name: &str) -> Result<Option<Tenant>, CacheError> {
        match self.provider.get(&self.key(name)).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CacheError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Store a tenant under its name. `None` or a zero TTL uses the default.
    pub async fn set(&self, tenant: &Tenant, ttl: Option<Duration>) -> Result<(), CacheError> {
        if tenant.name.trim().is_empty() {
            return Err(CacheError::InvalidInput(
                "tenant name cannot be empty".to_string(),
            ));
        }

        let ttl = match ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.default_ttl,
        };
        let bytes =
            serde_json::to_vec(tenant).map_err(|e| CacheError::Serialization(e.to_string()))?;

        self.provider.set(&self.key(&tenant.name), bytes, ttl).await
    }

    /// Remove a cached tenant
    pub async fn delete(&self, name: &str) -> Result<(), CacheError> {
        self.provider.delete(&self.key(name)).await
    }

    /// Remove every cached tenant under this cache's namespace
    pub async fn delete_all(&self) -> Result<u64, CacheError> {
        self.provider.delete_prefix(&self.prefix).await
    }
}

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process cache backend
///
/// Expiry is checked against the tokio clock on read; expired entries are
/// reported as misses and purged lazily.
#[derive(Default)]
pub struct MemoryCacheProvider {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCacheProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: purge unless a writer already refreshed it
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = MemoryEntry {
            value,
            expires_at: instant_after(ttl),
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::DatasourceRole;

    fn cache() -> (Arc<MemoryCacheProvider>, TenantCache) {
        let provider = Arc::new(MemoryCacheProvider::new());
        let cache = TenantCache::new(provider.clone());
        (provider, cache)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_, cache) = cache();
        let tenant = Tenant::new("acme").with_datasource("store://acme", DatasourceRole::ReadWrite, 5);

        cache.set(&tenant, None).await.unwrap();
        let cached = cache.get("acme").await.unwrap();

        assert_eq!(cached, Some(tenant));
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        let (_, cache) = cache();
        assert!(cache.get("missing").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let (provider, cache) = cache();
        let tenant = Tenant::new("acme");

        cache.set(&tenant, Some(Duration::from_secs(10))).await.unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get("acme").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("acme").await.unwrap().is_none());
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_unbounded_ttl_does_not_overflow() {
        let (_, cache) = cache();
        cache.set(&Tenant::new("acme"), Some(Duration::MAX)).await.unwrap();
        assert_eq!(cache.get("acme").await.unwrap().unwrap().name, "acme");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_uses_default() {
        let (_, cache) = cache();
        let cache = cache.with_default_ttl(Duration::from_secs(60));

        cache.set(&Tenant::new("acme"), Some(Duration::ZERO)).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("acme").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (provider, cache) = cache();
        let mut tenant = Tenant::new("acme");
        tenant.name = " ".to_string();

        let result = cache.set(&tenant, None).await;
        assert!(matches!(result, Err(CacheError::InvalidInput(_))));
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_, cache) = cache();
        cache.set(&Tenant::new("acme"), None).await.unwrap();

        cache.delete("acme").await.unwrap();
        cache.delete("acme").await.unwrap();
        assert!(cache.get("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all_only_touches_namespace() {
        let (provider, cache) = cache();
        cache.set(&Tenant::new("acme"), None).await.unwrap();
        cache.set(&Tenant::new("globex"), None).await.unwrap();
        provider
            .set("other:key", b"x".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.delete_all().await.unwrap(), 2);
        assert_eq!(provider.len(), 1);
        assert!(provider.get("other:key").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_serialization_error() {
        let (provider, cache) = cache();
        provider
            .set(&cache.key("acme"), b"not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(matches!(
            cache.get("acme").await,
            Err(CacheError::Serialization(_))
        ));
    }
}
