//! Tenant selection for command-line tools.

use crate::error::{CliError, CliResult, TaskError};
use std::future::Future;
use std::sync::Arc;
use tenantry_core::{TenantContext, TenantError, TenantService};
use tracing::{Instrument, debug};

/// Default environment variable naming the tenant.
pub const DEFAULT_ENV_VAR: &str = "TENANT_NAME";

/// Resolves tenants named by the environment or the command line.
#[derive(Clone)]
pub struct TenantResolver {
    service: Arc<TenantService>,
    env_var: String,
}

impl TenantResolver {
    pub fn new(service: Arc<TenantService>) -> Self {
        Self {
            service,
            env_var: DEFAULT_ENV_VAR.to_string(),
        }
    }

    /// Read the tenant name from `name` instead of `TENANT_NAME`.
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = name.into();
        self
    }

    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    pub fn service(&self) -> &Arc<TenantService> {
        &self.service
    }

    /// Resolve `name` and attach it to a child of `ctx`.
    pub async fn resolve(&self, ctx: &TenantContext, name: &str) -> CliResult<TenantContext> {
        let tenant = self.service.get_tenant(ctx, name).await?;
        Ok(ctx.with_tenant(tenant))
    }

    /// Resolve the tenant named by the configured environment variable.
    pub async fn resolve_from_env(&self, ctx: &TenantContext) -> CliResult<TenantContext> {
        self.resolve_from_lookup(ctx, |key| std::env::var(key).ok()).await
    }

    /// Same as [`resolve_from_env`](Self::resolve_from_env) with an explicit
    /// variable source.
    pub async fn resolve_from_lookup<F>(&self, ctx: &TenantContext, lookup: F) -> CliResult<TenantContext>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup(&self.env_var)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| CliError::MissingEnv(self.env_var.clone()))?;
        self.resolve(ctx, name.trim()).await
    }

    /// Resolve the tenant named by `--tenant=name` or `--tenant name`.
    pub async fn resolve_from_args<S: AsRef<str>>(&self, ctx: &TenantContext, args: &[S]) -> CliResult<TenantContext> {
        let name = tenant_from_args(args).ok_or(CliError::MissingArgument)?;
        self.resolve(ctx, &name).await
    }

    /// Resolve `name` and run `f` with it attached.
    pub async fn with_tenant<F, Fut, T>(&self, ctx: &TenantContext, name: &str, f: F) -> CliResult<T>
    where
        F: FnOnce(TenantContext) -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        let tenant_ctx = self.resolve(ctx, name).await?;
        let span = tenant_ctx.span("cli.task");
        f(tenant_ctx).instrument(span).await.map_err(|e| CliError::task(name, e))
    }

    /// Run `f` once per active tenant, in store order.
    ///
    /// Stops at the first failing tenant. Inactive tenants are skipped.
    pub async fn for_each_tenant<F, Fut>(&self, ctx: &TenantContext, mut f: F) -> CliResult<()>
    where
        F: FnMut(TenantContext) -> Fut,
        Fut: Future<Output = Result<(), TaskError>>,
    {
        let tenants = self.service.list_tenants(ctx).await?;

        for tenant in tenants {
            if !tenant.is_active {
                debug!(tenant = %tenant.name, "skipping inactive tenant");
                continue;
            }
            if ctx.is_cancelled() {
                return Err(TenantError::Cancelled.into());
            }

            let name = tenant.name.clone();
            let tenant_ctx = ctx.with_tenant(tenant);
            let span = tenant_ctx.span("cli.task");
            f(tenant_ctx).instrument(span).await.map_err(|e| CliError::task(&name, e))?;
        }
        Ok(())
    }
}

/// Tenant name given by `--tenant=name` or `--tenant name`.
///
/// The first occurrence wins.
pub fn tenant_from_args<S: AsRef<str>>(args: &[S]) -> Option<String> {
    let mut iter = args.iter().map(AsRef::as_ref);
    while let Some(arg) = iter.next() {
        if let Some(name) = arg.strip_prefix("--tenant=") {
            return Some(name.to_string());
        }
        if arg == "--tenant" {
            return iter.next().map(str::to_string);
        }
    }
    None
}
