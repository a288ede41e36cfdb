//! CLI error types.

use tenantry_core::TenantError;
use thiserror::Error;

/// Error returned by a per-tenant task.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;

/// CLI and worker errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("environment variable {0} not set")]
    MissingEnv(String),

    #[error("tenant argument not found (use --tenant=name or --tenant name)")]
    MissingArgument,

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error("error processing tenant {tenant}: {source}")]
    Task {
        tenant: String,
        #[source]
        source: TaskError,
    },

    #[error("Worker already running")]
    WorkerAlreadyRunning,

    #[error("Worker not running")]
    WorkerNotRunning,
}

impl CliError {
    pub(crate) fn task(tenant: &str, source: TaskError) -> Self {
        Self::Task {
            tenant: tenant.to_string(),
            source,
        }
    }

    /// Name of the tenant whose task failed, if any.
    pub fn tenant(&self) -> Option<&str> {
        match self {
            Self::Task { tenant, .. } => Some(tenant),
            _ => None,
        }
    }
}
