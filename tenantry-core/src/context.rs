//! Request-scoped tenant context
//!
//! A `TenantContext` is an immutable value passed explicitly down a call
//! chain. Deriving a child (attaching a tenant, adding a timeout or a
//! cancellation handle) never mutates the parent, and every derived
//! context keeps the parent's tenant.

use crate::error::TenantError;
use crate::tenant::Tenant;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Tenant context stored in a request or task
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    tenant: Option<Arc<Tenant>>,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl TenantContext {
    /// Root context with no tenant, deadline or cancellation
    pub fn background() -> Self {
        Self::default()
    }

    /// Child context carrying `tenant`
    ///
    /// # Examples
    ///
    /// ```
    /// use tenantry_core::{Tenant, TenantContext};
    ///
    /// let root = TenantContext::background();
    /// let ctx = root.with_tenant(Tenant::new("acme"));
    ///
    /// assert_eq!(ctx.tenant_name(), Some("acme"));
    /// assert!(!root.has_tenant());
    /// ```
    pub fn with_tenant(&self, tenant: impl Into<Arc<Tenant>>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            ..self.clone()
        }
    }

    /// Get tenant
    pub fn tenant(&self) -> Option<&Tenant> {
        self.tenant.as_deref()
    }

    /// Get a shared handle to the tenant
    pub fn tenant_arc(&self) -> Option<Arc<Tenant>> {
        self.tenant.clone()
    }

    /// Get the tenant, asserting that one was attached.
    ///
    /// # Panics
    ///
    /// Panics if the context carries no tenant.
    pub fn require_tenant(&self) -> &Tenant {
        match self.tenant() {
            Some(tenant) => tenant,
            None => panic!("tenant not found in context"),
        }
    }

    /// Get tenant ID
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant().map(|t| t.id.as_str())
    }

    /// Get tenant name
    pub fn tenant_name(&self) -> Option<&str> {
        self.tenant().map(|t| t.name.as_str())
    }

    /// Check if tenant is set
    pub fn has_tenant(&self) -> bool {
        self.tenant.is_some()
    }

    /// Check the attached tenant is present, active and well-formed
    pub fn validate(&self) -> Result<&Tenant, TenantError> {
        let tenant = self.tenant().ok_or(TenantError::MissingTenant)?;
        if !tenant.is_active {
            return Err(TenantError::Inactive(tenant.name.clone()));
        }
        tenant.validate()?;
        Ok(tenant)
    }

    /// Attach this context's tenant, if any, to `target`
    pub fn copy_tenant_to(&self, target: &TenantContext) -> TenantContext {
        match &self.tenant {
            Some(tenant) => target.with_tenant(Arc::clone(tenant)),
            None => target.clone(),
        }
    }

    /// Child context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(instant_after(timeout))
    }

    /// Child context that expires at `deadline`, or earlier if the parent does
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Child context plus the token that cancels it.
    ///
    /// Cancelling the parent cancels the child; cancelling the child leaves
    /// the parent untouched.
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = self.cancellation.child_token();
        let ctx = Self {
            cancellation: token.clone(),
            ..self.clone()
        };
        (ctx, token)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run `fut` until it completes, the context is cancelled, or the deadline passes
    pub async fn run<F, T>(&self, fut: F) -> Result<T, TenantError>
    where
        F: Future<Output = Result<T, TenantError>>,
    {
        if self.is_cancelled() {
            return Err(TenantError::Cancelled);
        }
        if self.deadline.is_some_and(|at| at <= Instant::now()) {
            return Err(TenantError::DeadlineExceeded);
        }

        let deadline = self.deadline;
        let bounded = async move {
            match deadline {
                Some(at) => match tokio::time::timeout_at(at, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(TenantError::DeadlineExceeded),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(TenantError::Cancelled),
            result = bounded => result,
        }
    }

    /// Tracing span tagged with the tenant's id and name
    pub fn span(&self, operation: &str) -> tracing::Span {
        tracing::info_span!(
            "tenant",
            operation = operation,
            tenant.id = self.tenant_id().unwrap_or_default(),
            tenant.name = self.tenant_name().unwrap_or_default(),
        )
    }
}

/// Run `f` with `tenant` attached to a child of `ctx`
pub async fn execute_with_tenant<F, Fut, T>(ctx: &TenantContext, tenant: Tenant, f: F) -> T
where
    F: FnOnce(TenantContext) -> Fut,
    Fut: Future<Output = T>,
{
    f(ctx.with_tenant(tenant)).await
}

/// `Instant::now() + after`, capped at thirty years so huge durations
/// cannot overflow.
pub(crate) fn instant_after(after: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
    let now = Instant::now();
    now.checked_add(after.min(FAR_FUTURE)).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_has_no_tenant() {
        let ctx = TenantContext::background();
        assert!(!ctx.has_tenant());
        assert!(ctx.tenant().is_none());
        assert!(ctx.tenant_id().is_none());
    }

    #[test]
    fn test_with_tenant_does_not_mutate_parent() {
        let parent = TenantContext::background();
        let child = parent.with_tenant(Tenant::new("acme"));

        assert!(!parent.has_tenant());
        assert_eq!(child.tenant_name(), Some("acme"));
    }

    #[test]
    #[should_panic(expected = "tenant not found in context")]
    fn test_require_tenant_panics_without_tenant() {
        TenantContext::background().require_tenant();
    }

    #[tokio::test]
    async fn test_derived_contexts_keep_tenant() {
        let ctx = TenantContext::background().with_tenant(Tenant::new("acme"));

        let timed = ctx.with_timeout(Duration::from_secs(5));
        let (cancellable, _token) = timed.with_cancel();

        assert_eq!(timed.tenant_name(), Some("acme"));
        assert_eq!(cancellable.tenant_name(), Some("acme"));
        assert_eq!(cancellable.require_tenant().name, "acme");
    }

    #[tokio::test]
    async fn test_child_deadline_never_extends_parent() {
        let parent = TenantContext::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_cancel_child_leaves_parent() {
        let parent = TenantContext::background();
        let (child, token) = parent.with_cancel();

        token.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_parent_cancels_child() {
        let (parent, token) = TenantContext::background().with_cancel();
        let (child, _) = parent.with_cancel();

        token.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_validate() {
        assert!(matches!(
            TenantContext::background().validate(),
            Err(TenantError::MissingTenant)
        ));

        let inactive = TenantContext::background().with_tenant(Tenant::new("acme").with_active(false));
        assert!(matches!(inactive.validate(), Err(TenantError::Inactive(_))));

        let ctx = TenantContext::background().with_tenant(Tenant::new("acme"));
        assert_eq!(ctx.validate().unwrap().name, "acme");
    }

    #[test]
    fn test_copy_tenant_to() {
        let source = TenantContext::background().with_tenant(Tenant::new("acme"));
        let (target, _) = TenantContext::background().with_cancel();

        let copied = source.copy_tenant_to(&target);
        assert_eq!(copied.tenant_name(), Some("acme"));

        let empty = TenantContext::background().copy_tenant_to(&source);
        assert_eq!(empty.tenant_name(), Some("acme"));
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = TenantContext::background();
        let value = ctx.run(async { Ok::<_, TenantError>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_respects_cancellation() {
        let (ctx, token) = TenantContext::background().with_cancel();
        token.cancel();

        let result = ctx.run(async { Ok::<_, TenantError>(()) }).await;
        assert!(matches!(result, Err(TenantError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_respects_deadline() {
        let ctx = TenantContext::background().with_timeout(Duration::from_millis(100));

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, TenantError>(())
            })
            .await;
        assert!(matches!(result, Err(TenantError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_overflow() {
        let ctx = TenantContext::background().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_some_and(|at| at > Instant::now()));

        let value = ctx.run(async { Ok::<_, TenantError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_execute_with_tenant() {
        let ctx = TenantContext::background();
        let name = execute_with_tenant(&ctx, Tenant::new("acme"), |ctx| async move {
            ctx.require_tenant().name.clone()
        })
        .await;
        assert_eq!(name, "acme");
    }
}
