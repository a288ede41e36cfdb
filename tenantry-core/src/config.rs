//! Configuration
//!
//! `TenantryConfig` can be built in code, read from `TENANTRY_*`
//! environment variables (with an optional `.env` file) or parsed from
//! TOML. Durations use humantime syntax: `500ms`, `30s`, `5m`, `1h` or
//! combinations such as `1h 30m`.

use crate::cache::DEFAULT_CACHE_TTL;
use crate::error::TenantError;
use crate::pool::PoolSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TENANTRY";

/// Default tenant header
pub const DEFAULT_HEADER_NAME: &str = "X-Tenant-Id";

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Backend holding tenant records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    Postgres,
    Mongodb,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::Mongodb => f.write_str("mongodb"),
        }
    }
}

impl FromStr for DatabaseType {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mongodb" | "mongo" => Ok(Self::Mongodb),
            other => Err(TenantError::config(
                "database_type",
                format!("invalid database type: {} (must be 'postgres' or 'mongodb')", other),
            )),
        }
    }
}

/// Tenantry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantryConfig {
    /// Tenant store backend
    pub database_type: DatabaseType,

    /// Tenant store connection string
    pub database_dsn: String,

    /// Cache backend URL
    pub redis_url: String,

    /// Lifetime of cached tenants
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Request header carrying the tenant name
    pub header_name: String,

    /// Default maximum pool size when a datasource does not set one
    pub pool_size: u32,

    /// Connection attempts after the first failure
    pub max_retries: u32,

    /// Delay between connection attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Log level (debug, info, warn, error)
    pub log_level: String,

    /// Path prefixes that skip tenant resolution
    pub ignored_endpoints: Vec<String>,

    /// Process-wide pool limits
    pub pool: PoolSettings,
}

impl Default for TenantryConfig {
    fn default() -> Self {
        Self {
            database_type: DatabaseType::Postgres,
            database_dsn: String::new(),
            redis_url: String::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            header_name: DEFAULT_HEADER_NAME.to_string(),
            pool_size: 10,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            log_level: "info".to_string(),
            ignored_endpoints: Vec::new(),
            pool: PoolSettings::default(),
        }
    }
}

impl TenantryConfig {
    /// Create a builder.
    pub fn builder() -> TenantryConfigBuilder {
        TenantryConfigBuilder::new()
    }

    /// Load from `TENANTRY_*` environment variables and validate.
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self, TenantError> {
        let _ = dotenvy::dotenv();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a variable lookup, without validating.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TenantError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}_{}", ENV_PREFIX, name)).filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(db_type) = var("DATABASE_TYPE") {
            config.database_type = db_type.parse()?;
        }
        if let Some(dsn) = var("DATABASE_DSN") {
            config.database_dsn = dsn;
        }
        if let Some(url) = var("REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(ttl) = var("CACHE_TTL") {
            config.cache_ttl = humantime::parse_duration(&ttl)
                .map_err(|e| TenantError::config("cache_ttl", format!("invalid duration {:?}: {}", ttl, e)))?;
        }
        if let Some(header) = var("HEADER_NAME") {
            config.header_name = header;
        }
        if let Some(size) = var("POOL_SIZE") {
            config.pool_size = size.parse().map_err(|_| {
                TenantError::config("pool_size", format!("invalid pool size: {} (must be a positive integer)", size))
            })?;
        }
        if let Some(retries) = var("MAX_RETRIES") {
            config.max_retries = retries.parse().map_err(|_| {
                TenantError::config(
                    "max_retries",
                    format!("invalid max retries: {} (must be a non-negative integer)", retries),
                )
            })?;
        }
        if let Some(delay) = var("RETRY_DELAY") {
            config.retry_delay = humantime::parse_duration(&delay)
                .map_err(|e| TenantError::config("retry_delay", format!("invalid duration {:?}: {}", delay, e)))?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(endpoints) = var("IGNORED_ENDPOINTS") {
            config.ignored_endpoints = endpoints
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(config)
    }

    /// Parse TOML text and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, TenantError> {
        let config: Self =
            toml::from_str(text).map_err(|e| TenantError::config("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, TenantError> {
        toml::to_string(self).map_err(|e| TenantError::config("toml", e.to_string()))
    }

    /// Pool defaults with `pool_size` as the maximum size.
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_size: self.pool_size,
            ..self.pool.clone()
        }
    }

    pub fn is_development(&self) -> bool {
        self.log_level.eq_ignore_ascii_case("debug")
    }

    pub fn is_production(&self) -> bool {
        self.log_level.eq_ignore_ascii_case("warn") || self.log_level.eq_ignore_ascii_case("error")
    }

    /// Check every field, returning the first violation.
    pub fn validate(&self) -> Result<(), TenantError> {
        if self.database_dsn.is_empty() {
            return Err(TenantError::config("database_dsn", "database DSN is required"));
        }
        match self.database_type {
            DatabaseType::Postgres => {
                if !has_scheme(&self.database_dsn, &["postgres://", "postgresql://"]) {
                    return Err(TenantError::config(
                        "database_dsn",
                        "PostgreSQL DSN must start with 'postgres://' or 'postgresql://'",
                    ));
                }
            }
            DatabaseType::Mongodb => {
                if !has_scheme(&self.database_dsn, &["mongodb://", "mongodb+srv://"]) {
                    return Err(TenantError::config(
                        "database_dsn",
                        "MongoDB DSN must start with 'mongodb://' or 'mongodb+srv://'",
                    ));
                }
            }
        }

        if self.redis_url.is_empty() {
            return Err(TenantError::config("redis_url", "Redis URL is required"));
        }
        if !has_scheme(&self.redis_url, &["redis://", "rediss://"]) {
            return Err(TenantError::config(
                "redis_url",
                "Redis URL must start with 'redis://' or 'rediss://'",
            ));
        }

        if self.pool_size == 0 {
            return Err(TenantError::config("pool_size", "pool size must be greater than 0"));
        }
        if self.pool_size > 100 {
            return Err(TenantError::config(
                "pool_size",
                format!("pool size too large (max 100), got: {}", self.pool_size),
            ));
        }

        if self.max_retries > 10 {
            return Err(TenantError::config(
                "max_retries",
                format!("max retries too large (max 10), got: {}", self.max_retries),
            ));
        }

        if self.cache_ttl.is_zero() {
            return Err(TenantError::config("cache_ttl", "cache TTL must be greater than 0"));
        }
        if self.cache_ttl > Duration::from_secs(24 * 60 * 60) {
            return Err(TenantError::config(
                "cache_ttl",
                format!("cache TTL too large (max 24h), got: {}", humantime::format_duration(self.cache_ttl)),
            ));
        }

        if self.retry_delay > Duration::from_secs(60) {
            return Err(TenantError::config(
                "retry_delay",
                format!("retry delay too large (max 1m), got: {}", humantime::format_duration(self.retry_delay)),
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(TenantError::config(
                "log_level",
                format!(
                    "invalid log level: {} (must be debug, info, warn, or error)",
                    self.log_level
                ),
            ));
        }

        if self.header_name.is_empty() {
            return Err(TenantError::config("header_name", "header name cannot be empty"));
        }
        if self.header_name.len() > 100 {
            return Err(TenantError::config(
                "header_name",
                format!("header name too long (max 100 chars), got: {}", self.header_name.len()),
            ));
        }

        Ok(())
    }
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes.iter().any(|scheme| url.starts_with(scheme))
}

/// Builder for Tenantry configuration.
#[derive(Debug, Clone, Default)]
pub struct TenantryConfigBuilder {
    config: TenantryConfig,
}

impl TenantryConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: TenantryConfig) -> Self {
        Self { config }
    }

    /// Store tenants in PostgreSQL.
    pub fn postgres(mut self, dsn: impl Into<String>) -> Self {
        self.config.database_type = DatabaseType::Postgres;
        self.config.database_dsn = dsn.into();
        self
    }

    /// Store tenants in MongoDB.
    pub fn mongodb(mut self, dsn: impl Into<String>) -> Self {
        self.config.database_type = DatabaseType::Mongodb;
        self.config.database_dsn = dsn.into();
        self
    }

    /// Set the Redis URL.
    pub fn redis(mut self, url: impl Into<String>) -> Self {
        self.config.redis_url = url.into();
        self
    }

    /// Set the cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// Set the tenant header.
    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.config.header_name = name.into();
        self
    }

    /// Set the default pool size.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the connection retry policy.
    pub fn retry(mut self, max_retries: u32, delay: Duration) -> Self {
        self.config.max_retries = max_retries;
        self.config.retry_delay = delay;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Skip tenant resolution for paths starting with `endpoint`.
    pub fn ignored_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.ignored_endpoints.push(endpoint.into());
        self
    }

    /// Replace the ignored endpoint list.
    pub fn ignored_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.config.ignored_endpoints = endpoints;
        self
    }

    /// Set process-wide pool limits.
    pub fn pool_settings(mut self, settings: PoolSettings) -> Self {
        self.config.pool = settings;
        self
    }

    /// Verbose logging, short cache lifetime, small pools.
    pub fn development(mut self) -> Self {
        self.config.log_level = "debug".to_string();
        self.config.cache_ttl = Duration::from_secs(60);
        self.config.pool_size = 5;
        self
    }

    /// Quiet logging, long cache lifetime, larger pools, more retries.
    pub fn production(mut self) -> Self {
        self.config.log_level = "warn".to_string();
        self.config.cache_ttl = Duration::from_secs(15 * 60);
        self.config.pool_size = 20;
        self.config.max_retries = 5;
        self.config.retry_delay = Duration::from_secs(2);
        self
    }

    /// Minimal pools and fast retries.
    pub fn testing(mut self) -> Self {
        self.config.log_level = "error".to_string();
        self.config.cache_ttl = Duration::from_secs(30);
        self.config.pool_size = 2;
        self.config.max_retries = 1;
        self.config.retry_delay = Duration::from_millis(100);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<TenantryConfig, TenantError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> TenantryConfigBuilder {
        TenantryConfig::builder()
            .postgres("postgres://localhost/tenants")
            .redis("redis://localhost:6379")
    }

    fn field_of(result: Result<TenantryConfig, TenantError>) -> String {
        match result {
            Err(TenantError::Config { field, .. }) => field,
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = TenantryConfig::default();
        assert_eq!(config.header_name, "X-Tenant-Id");
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_builder_validates() {
        let config = valid().pool_size(20).build().unwrap();
        assert_eq!(config.pool_settings().max_size, 20);
        assert_eq!(config.pool_settings().min_size, 2);
    }

    #[test]
    fn test_validation_rules() {
        assert_eq!(field_of(TenantryConfig::builder().redis("redis://x").build()), "database_dsn");
        assert_eq!(field_of(valid().postgres("mysql://x").build()), "database_dsn");
        assert_eq!(field_of(valid().mongodb("postgres://x").build()), "database_dsn");
        assert_eq!(field_of(valid().redis("").build()), "redis_url");
        assert_eq!(field_of(valid().redis("http://x").build()), "redis_url");
        assert_eq!(field_of(valid().pool_size(0).build()), "pool_size");
        assert_eq!(field_of(valid().pool_size(101).build()), "pool_size");
        assert_eq!(
            field_of(valid().retry(11, Duration::from_secs(1)).build()),
            "max_retries"
        );
        assert_eq!(
            field_of(valid().retry(3, Duration::from_secs(61)).build()),
            "retry_delay"
        );
        assert_eq!(field_of(valid().cache_ttl(Duration::ZERO).build()), "cache_ttl");
        assert_eq!(
            field_of(valid().cache_ttl(Duration::from_secs(25 * 3600)).build()),
            "cache_ttl"
        );
        assert_eq!(field_of(valid().log_level("trace").build()), "log_level");
        assert_eq!(field_of(valid().header_name("").build()), "header_name");
        assert_eq!(field_of(valid().header_name("x".repeat(101)).build()), "header_name");
    }

    #[test]
    fn test_mongo_schemes() {
        assert!(valid().mongodb("mongodb://localhost").build().is_ok());
        assert!(valid().mongodb("mongodb+srv://cluster.example").build().is_ok());
    }

    #[test]
    fn test_presets() {
        let dev = valid().development().build().unwrap();
        assert!(dev.is_development());
        assert_eq!(dev.pool_size, 5);

        let prod = valid().production().build().unwrap();
        assert!(prod.is_production());
        assert_eq!(prod.max_retries, 5);

        let test = valid().testing().build().unwrap();
        assert_eq!(test.retry_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TENANTRY_DATABASE_TYPE", "mongodb"),
            ("TENANTRY_DATABASE_DSN", "mongodb://localhost:27017"),
            ("TENANTRY_REDIS_URL", "redis://localhost:6379"),
            ("TENANTRY_CACHE_TTL", "10m"),
            ("TENANTRY_POOL_SIZE", "25"),
            ("TENANTRY_RETRY_DELAY", "500ms"),
            ("TENANTRY_IGNORED_ENDPOINTS", "/health, /metrics"),
        ]);

        let config = TenantryConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.database_type, DatabaseType::Mongodb);
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(config.pool_size, 25);
        assert_eq!(config.retry_delay, Duration::from_millis(500));
        assert_eq!(config.ignored_endpoints, vec!["/health", "/metrics"]);
        assert_eq!(config.header_name, "X-Tenant-Id");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_rejects_malformed() {
        let result = TenantryConfig::from_lookup(|key| {
            (key == "TENANTRY_POOL_SIZE").then(|| "lots".to_string())
        });
        assert_eq!(field_of(result), "pool_size");

        let result = TenantryConfig::from_lookup(|key| {
            (key == "TENANTRY_DATABASE_TYPE").then(|| "oracle".to_string())
        });
        assert_eq!(field_of(result), "database_type");
    }

    #[test]
    fn test_from_lookup_durations() {
        let config = TenantryConfig::from_lookup(|key| match key {
            "TENANTRY_CACHE_TTL" => Some("1h 30m".to_string()),
            "TENANTRY_RETRY_DELAY" => Some("1500ms".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(5400));
        assert_eq!(config.retry_delay, Duration::from_millis(1500));

        let result = TenantryConfig::from_lookup(|key| (key == "TENANTRY_CACHE_TTL").then(|| "10".to_string()));
        assert_eq!(field_of(result), "cache_ttl");

        let result = TenantryConfig::from_lookup(|key| (key == "TENANTRY_RETRY_DELAY").then(|| "soon".to_string()));
        assert_eq!(field_of(result), "retry_delay");
    }

    #[test]
    fn test_oversized_ttl_message() {
        let err = valid().cache_ttl(Duration::from_secs(25 * 3600)).build().unwrap_err();
        assert!(err.to_string().contains("cache TTL too large (max 24h), got: 1day 1h"), "{}", err);
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
            database_type = "postgres"
            database_dsn = "postgres://localhost/tenants"
            redis_url = "redis://localhost:6379"
            cache_ttl = "2m"
            header_name = "X-Org"
            ignored_endpoints = ["/health"]

            [pool]
            min_size = 1
            max_idle_time = "30s"
        "#;

        let config = TenantryConfig::from_toml_str(text).unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(120));
        assert_eq!(config.header_name, "X-Org");
        assert_eq!(config.pool.min_size, 1);
        assert_eq!(config.pool.max_idle_time, Duration::from_secs(30));
        assert_eq!(config.pool.max_lifetime, Duration::from_secs(3600));
    }

    #[test]
    fn test_toml_output_parses_back() {
        let config = valid().development().ignored_endpoint("/health").build().unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(TenantryConfig::from_toml_str(&text).unwrap(), config);
    }
}
