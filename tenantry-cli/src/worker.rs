//! Polling worker running a task per tenant.

use crate::error::{CliError, CliResult, TaskError};
use crate::resolver::TenantResolver;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tenantry_core::TenantContext;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Future returned by a [`TenantTask`].
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

/// Per-tenant task run by a [`Worker`].
pub type TenantTask = Arc<dyn Fn(TenantContext) -> TaskFuture + Send + Sync>;

/// Poll interval used when none (or zero) is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Run the task for every active tenant each round
    pub process_all: bool,

    /// Tenant to process when `process_all` is false; falls back to the
    /// resolver's environment variable
    pub tenant_name: Option<String>,

    /// Delay between rounds; zero means [`DEFAULT_POLL_INTERVAL`]
    pub poll_interval: Duration,

    /// Stop on Ctrl-C
    pub handle_ctrl_c: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            process_all: false,
            tenant_name: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            handle_ctrl_c: true,
        }
    }
}

impl WorkerConfig {
    /// Process every active tenant.
    pub fn all_tenants() -> Self {
        Self {
            process_all: true,
            ..Self::default()
        }
    }

    /// Process a single named tenant.
    pub fn single(tenant: impl Into<String>) -> Self {
        Self {
            tenant_name: Some(tenant.into()),
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_ctrl_c(mut self, enabled: bool) -> Self {
        self.handle_ctrl_c = enabled;
        self
    }
}

/// Background worker.
///
/// Runs one round immediately on start, then one per poll interval, until
/// [`shutdown`](Worker::shutdown) is called, the parent context is
/// cancelled, or Ctrl-C arrives. Task failures are logged and never stop
/// the loop.
pub struct Worker {
    resolver: Arc<TenantResolver>,
    config: WorkerConfig,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Create a new worker.
    pub fn new(resolver: TenantResolver) -> Self {
        Self::with_config(resolver, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(resolver: TenantResolver, mut config: WorkerConfig) -> Self {
        if config.poll_interval.is_zero() {
            config.poll_interval = DEFAULT_POLL_INTERVAL;
        }
        Self {
            resolver: Arc::new(resolver),
            config,
            shutdown: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Token that stops the worker when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Check if the worker loop is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the worker.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tenantry_cli::{TaskError, TenantResolver, Worker, WorkerConfig};
    /// use tenantry_core::TenantContext;
    ///
    /// # async fn example(resolver: TenantResolver) -> tenantry_cli::CliResult<()> {
    /// let mut worker = Worker::with_config(resolver, WorkerConfig::all_tenants());
    /// worker.start(TenantContext::background(), |ctx| async move {
    ///     println!("syncing {}", ctx.require_tenant().name);
    ///     Ok::<_, TaskError>(())
    /// })?;
    ///
    /// worker.shutdown().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn start<F, Fut>(&mut self, ctx: TenantContext, f: F) -> CliResult<()>
    where
        F: Fn(TenantContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        if self.handle.is_some() {
            return Err(CliError::WorkerAlreadyRunning);
        }

        let task: TenantTask = Arc::new(move |ctx: TenantContext| -> TaskFuture { Box::pin(f(ctx)) });

        if self.config.handle_ctrl_c {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if result.is_ok() {
                            info!("interrupt received, stopping worker");
                            shutdown.cancel();
                        }
                    }
                    _ = shutdown.cancelled() => {}
                }
            });
        }

        let resolver = self.resolver.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();

        info!(
            process_all = config.process_all,
            poll_interval = ?config.poll_interval,
            "worker starting"
        );

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ctx.cancellation().cancelled() => break,
                    _ = ticker.tick() => process(&resolver, &config, &ctx, &task).await,
                }
            }

            info!("worker stopped");
        }));

        Ok(())
    }

    /// Stop the loop and wait for the current round to finish.
    pub async fn shutdown(&mut self) -> CliResult<()> {
        let handle = self.handle.take().ok_or(CliError::WorkerNotRunning)?;
        self.shutdown.cancel();
        if let Err(e) = handle.await {
            error!(error = %e, "worker task panicked");
        }
        Ok(())
    }
}

async fn process(resolver: &TenantResolver, config: &WorkerConfig, ctx: &TenantContext, task: &TenantTask) {
    if config.process_all {
        if let Err(e) = resolver.for_each_tenant(ctx, |tenant_ctx| task(tenant_ctx)).await {
            error!(error = %e, "error processing tenants");
        }
        return;
    }

    let name = config
        .tenant_name
        .clone()
        .or_else(|| std::env::var(resolver.env_var()).ok())
        .filter(|name| !name.trim().is_empty());
    let Some(name) = name else {
        warn!(env_var = resolver.env_var(), "no tenant specified");
        return;
    };

    if let Err(e) = resolver.with_tenant(ctx, &name, |tenant_ctx| task(tenant_ctx)).await {
        error!(tenant = %name, error = %e, "error processing tenant");
    }
}
