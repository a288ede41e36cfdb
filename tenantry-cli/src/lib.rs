//! Command-line and worker tenant resolution for Tenantry
//!
//! - [`TenantResolver`] picks a tenant from an environment variable
//!   (`TENANT_NAME` by default) or a `--tenant` argument, or iterates over
//!   every active tenant.
//! - [`Worker`] runs a task on a poll interval, for one tenant or all of
//!   them, until shut down.
//!
//! ```rust,ignore
//! use tenantry_cli::{TaskError, TenantResolver};
//!
//! let resolver = TenantResolver::new(service);
//! let args: Vec<String> = std::env::args().collect();
//! let ctx = resolver.resolve_from_args(&TenantContext::background(), &args).await?;
//! run_migration(&ctx).await?;
//! ```

pub mod error;
pub mod resolver;
pub mod worker;

pub use error::{CliError, CliResult, TaskError};
pub use resolver::{DEFAULT_ENV_VAR, TenantResolver, tenant_from_args};
pub use worker::{DEFAULT_POLL_INTERVAL, TaskFuture, TenantTask, Worker, WorkerConfig};
