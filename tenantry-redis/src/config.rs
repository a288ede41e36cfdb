//! Redis cache configuration.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tenantry_core::{CacheError, TenantError};
use url::Url;

/// Redis cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    /// Redis URL (redis://host:port or rediss://host:port for TLS).
    pub url: String,
    /// Database number (0-15).
    pub database: Option<u8>,
    /// Username for Redis 6+ ACL.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Time allowed to establish the connection.
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
    /// Time allowed for a single command.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            database: None,
            username: None,
            password: None,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(3),
        }
    }
}

impl RedisCacheConfig {
    /// Create a configuration for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> RedisCacheConfigBuilder {
        RedisCacheConfigBuilder::new()
    }

    /// Load from `TENANTRY_REDIS_*` environment variables.
    pub fn from_env() -> Result<Self, TenantError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a variable lookup. Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TenantError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = RedisCacheConfigBuilder::new();

        if let Some(url) = lookup("TENANTRY_REDIS_URL") {
            builder = builder.url(url);
        }

        if let Some(db) = lookup("TENANTRY_REDIS_DATABASE")
            && let Ok(db) = db.parse()
        {
            builder = builder.database(db);
        }

        if let Some(username) = lookup("TENANTRY_REDIS_USERNAME") {
            builder = builder.username(username);
        }

        if let Some(password) = lookup("TENANTRY_REDIS_PASSWORD") {
            builder = builder.password(password);
        }

        if let Some(timeout) = lookup("TENANTRY_REDIS_CONNECTION_TIMEOUT") {
            let timeout = humantime::parse_duration(&timeout)
                .map_err(|e| TenantError::config("redis.connection_timeout", e.to_string()))?;
            builder = builder.connection_timeout(timeout);
        }

        if let Some(timeout) = lookup("TENANTRY_REDIS_COMMAND_TIMEOUT") {
            let timeout = humantime::parse_duration(&timeout)
                .map_err(|e| TenantError::config("redis.command_timeout", e.to_string()))?;
            builder = builder.command_timeout(timeout);
        }

        Ok(builder.build())
    }

    /// URL with credentials and database applied.
    ///
    /// Credentials are percent-encoded. The database is only added when the
    /// URL does not already select one.
    pub fn connection_url(&self) -> Result<String, CacheError> {
        let mut url = self.parsed_url()?;

        if let Some(username) = &self.username {
            let encoded = utf8_percent_encode(username, NON_ALPHANUMERIC).to_string();
            url.set_username(&encoded)
                .map_err(|_| CacheError::InvalidInput("Redis URL cannot carry credentials".to_string()))?;
        }
        if let Some(password) = &self.password {
            let encoded = utf8_percent_encode(password, NON_ALPHANUMERIC).to_string();
            url.set_password(Some(&encoded))
                .map_err(|_| CacheError::InvalidInput("Redis URL cannot carry credentials".to_string()))?;
        }

        if let Some(db) = self.database
            && matches!(url.path(), "" | "/")
        {
            url.set_path(&format!("/{}", db));
        }
        Ok(url.into())
    }

    /// URL safe for logs: scheme, host and port only.
    pub fn redacted_url(&self) -> String {
        match self.parsed_url() {
            Ok(url) => match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => format!("{}://{}:{}", url.scheme(), host, port),
                (Some(host), None) => format!("{}://{}", url.scheme(), host),
                _ => format!("{}://", url.scheme()),
            },
            Err(_) => "<invalid>".to_string(),
        }
    }

    fn parsed_url(&self) -> Result<Url, CacheError> {
        Url::parse(&self.url).map_err(|e| CacheError::InvalidInput(format!("invalid Redis URL: {}", e)))
    }
}

/// Builder for Redis cache configuration.
#[derive(Default)]
pub struct RedisCacheConfigBuilder {
    config: RedisCacheConfig,
}

impl RedisCacheConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Redis URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the database number.
    pub fn database(mut self, db: u8) -> Self {
        self.config.database = Some(db);
        self
    }

    /// Set the username (Redis 6+ ACL).
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the command timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RedisCacheConfig {
        self.config
    }
}
