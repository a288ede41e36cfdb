//! Error types for tenant resolution and pool management.

use crate::cache::CacheError;
use crate::tenant::DatasourceRole;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for tenant operations.
pub type Result<T> = std::result::Result<T, TenantError>;

/// Tenant errors.
#[derive(Debug, Error)]
pub enum TenantError {
    /// No tenant record for the given name or id.
    #[error("tenant not found: {0}")]
    NotFound(String),

    /// Tenant exists but is administratively disabled.
    #[error("tenant is inactive: {0}")]
    Inactive(String),

    /// Tenant or datasource failed a structural check.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Uniqueness violation reported by the persistent store.
    #[error("tenant already exists: {0}")]
    Conflict(String),

    /// No datasource satisfies the requested role.
    #[error("no datasource found for tenant {tenant} with role {role}")]
    NoDatasource {
        /// Tenant name
        tenant: String,
        /// Requested role
        role: DatasourceRole,
    },

    /// Cache backend failure.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Persistent store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Failed to open, verify or close a connection pool.
    #[error("connection error: {0}")]
    Connection(String),

    /// The context carries no tenant.
    #[error("tenant not found in context")]
    MissingTenant,

    /// Invalid configuration value.
    #[error("invalid configuration for {field}: {reason}")]
    Config {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// The context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The context deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl TenantError {
    /// Create a configuration error.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) | Self::MissingTenant => ErrorCode::TenantNotFound,
            Self::Inactive(_) => ErrorCode::TenantInactive,
            Self::Validation(_) => ErrorCode::TenantInvalid,
            Self::Conflict(_) => ErrorCode::TenantExists,
            Self::NoDatasource { .. } => ErrorCode::DatasourceNotFound,
            Self::Cache(_) => ErrorCode::CacheConnection,
            Self::Storage(_) => ErrorCode::DatabaseQuery,
            Self::Connection(_) => ErrorCode::DatabaseConnection,
            Self::Config { .. } => ErrorCode::ConfigInvalid,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::DeadlineExceeded => ErrorCode::Timeout,
        }
    }

    /// Check if this error means the tenant does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error means the tenant is disabled.
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Inactive(_))
    }

    /// Check if this error comes from an unreachable or failing backend.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Cache(_) | Self::Storage(_) | Self::Connection(_) | Self::DeadlineExceeded
        )
    }
}

/// Error code carried by [`TenantError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TenantNotFound,
    TenantInactive,
    TenantExists,
    TenantInvalid,
    DatasourceNotFound,
    DatabaseConnection,
    DatabaseQuery,
    CacheConnection,
    ConfigInvalid,
    Cancelled,
    Timeout,
    InternalError,
}

impl ErrorCode {
    /// Get the code string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenantNotFound => "TENANT_NOT_FOUND",
            Self::TenantInactive => "TENANT_INACTIVE",
            Self::TenantExists => "TENANT_EXISTS",
            Self::TenantInvalid => "TENANT_INVALID",
            Self::DatasourceNotFound => "DATASOURCE_NOT_FOUND",
            Self::DatabaseConnection => "DATABASE_CONNECTION",
            Self::DatabaseQuery => "DATABASE_QUERY",
            Self::CacheConnection => "CACHE_CONNECTION",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
