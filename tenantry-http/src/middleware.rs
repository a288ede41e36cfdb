//! Tenant Middleware
//!
//! Resolves the tenant named by a request header and stores the resulting
//! [`TenantContext`] in the request extensions.

use crate::rejection::TenantRejection;
use bytes::Bytes;
use http::{HeaderValue, Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tenantry_core::{DEFAULT_HEADER_NAME, Tenant, TenantContext, TenantService, TenantryConfig};
use tracing::{Instrument, debug, warn};

/// Response header carrying the resolved tenant name.
pub const TENANT_NAME_HEADER: &str = "X-Tenant-Name";

/// Boxed response future returned by the downstream handler.
pub type BoxResponseFuture = Pin<Box<dyn Future<Output = Response<Bytes>> + Send>>;

/// Downstream handler invoked once the tenant is attached.
pub type Next<B> = Box<dyn FnOnce(Request<B>) -> BoxResponseFuture + Send>;

/// Custom rendering of a rejected request.
pub type ErrorHandler = Arc<dyn Fn(&TenantRejection) -> Response<Bytes> + Send + Sync>;

/// Wrap an async function as a [`Next`] handler.
pub fn next_fn<B, F, Fut>(f: F) -> Next<B>
where
    F: FnOnce(Request<B>) -> Fut + Send + 'static,
    Fut: Future<Output = Response<Bytes>> + Send + 'static,
{
    Box::new(move |request| -> BoxResponseFuture { Box::pin(f(request)) })
}

/// Middleware settings
#[derive(Debug, Clone)]
pub struct TenantMiddlewareConfig {
    /// Request header naming the tenant
    pub header_name: String,

    /// Path prefixes that skip resolution
    pub ignored_endpoints: Vec<String>,

    /// Show server error details to clients
    pub expose_error_details: bool,
}

impl Default for TenantMiddlewareConfig {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_HEADER_NAME.to_string(),
            ignored_endpoints: Vec::new(),
            expose_error_details: false,
        }
    }
}

impl TenantMiddlewareConfig {
    /// Header name and ignored endpoints from the process configuration.
    pub fn from_config(config: &TenantryConfig) -> Self {
        Self {
            header_name: config.header_name.clone(),
            ignored_endpoints: config.ignored_endpoints.clone(),
            expose_error_details: false,
        }
    }

    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    pub fn with_ignored_endpoint(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_endpoints.push(prefix.into());
        self
    }

    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }
}

/// Tenant middleware
///
/// Requests on an ignored prefix pass straight through. Everything else
/// must name an active tenant or is answered with a JSON error.
pub struct TenantMiddleware {
    service: Arc<TenantService>,
    config: TenantMiddlewareConfig,
    error_handler: Option<ErrorHandler>,
}

impl TenantMiddleware {
    /// Create new tenant middleware
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use tenantry_http::{TenantMiddleware, TenantMiddlewareConfig};
    ///
    /// let middleware = TenantMiddleware::new(service, TenantMiddlewareConfig::default())
    ///     .with_error_handler(|rejection| rejection.to_response(true));
    /// ```
    pub fn new(service: Arc<TenantService>, config: TenantMiddlewareConfig) -> Self {
        Self {
            service,
            config,
            error_handler: None,
        }
    }

    /// Replace the default JSON error response.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TenantRejection) -> Response<Bytes> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn config(&self) -> &TenantMiddlewareConfig {
        &self.config
    }

    /// Check if `path` starts with an ignored prefix.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.config
            .ignored_endpoints
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Resolve the request's tenant into a context.
    ///
    /// A context already present in the request extensions is used as the
    /// parent, so its deadline and cancellation carry over.
    pub async fn resolve<B>(&self, request: &Request<B>) -> Result<TenantContext, TenantRejection> {
        let header = &self.config.header_name;
        let value = request
            .headers()
            .get(header.as_str())
            .ok_or_else(|| TenantRejection::MissingHeader(header.clone()))?;
        let name = value
            .to_str()
            .map_err(|_| TenantRejection::InvalidHeader(header.clone()))?
            .trim();
        if name.is_empty() {
            return Err(TenantRejection::MissingHeader(header.clone()));
        }

        let parent = tenant_context(request).cloned().unwrap_or_default();
        let tenant = self.service.get_tenant(&parent, name).await?;
        Ok(parent.with_tenant(tenant))
    }

    /// Resolve the tenant, then call `next` with it attached.
    pub async fn handle<B>(&self, mut request: Request<B>, next: Next<B>) -> Response<Bytes> {
        if self.is_ignored(request.uri().path()) {
            return next(request).await;
        }

        let ctx = match self.resolve(&request).await {
            Ok(ctx) => ctx,
            Err(rejection) => return self.reject(&request, &rejection),
        };

        let span = ctx.span("http.request");
        let tenant_name = ctx.tenant_name().map(HeaderValue::from_str);
        request.extensions_mut().insert(ctx);

        let mut response = next(request).instrument(span).await;
        if let Some(Ok(value)) = tenant_name {
            response.headers_mut().insert(TENANT_NAME_HEADER, value);
        }
        response
    }

    fn reject<B>(&self, request: &Request<B>, rejection: &TenantRejection) -> Response<Bytes> {
        if rejection.status().is_server_error() {
            warn!(path = %request.uri().path(), error = %rejection, "tenant resolution failed");
        } else {
            debug!(path = %request.uri().path(), error = %rejection, "tenant rejected");
        }

        match &self.error_handler {
            Some(handler) => handler(rejection),
            None => rejection.to_response(self.config.expose_error_details),
        }
    }
}

/// Tenant context stored by [`TenantMiddleware`].
pub fn tenant_context<B>(request: &Request<B>) -> Option<&TenantContext> {
    request.extensions().get::<TenantContext>()
}

/// Tenant stored by [`TenantMiddleware`].
pub fn tenant<B>(request: &Request<B>) -> Option<&Tenant> {
    tenant_context(request).and_then(TenantContext::tenant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tenantry_core::{InMemoryTenantStore, MemoryCacheProvider, TenantCache};

    async fn middleware(config: TenantMiddlewareConfig) -> TenantMiddleware {
        let service = TenantService::new(
            Arc::new(InMemoryTenantStore::new()),
            TenantCache::new(Arc::new(MemoryCacheProvider::new())),
        );
        let ctx = TenantContext::background();
        service.create_tenant(&ctx, Tenant::new("acme")).await.unwrap();
        service
            .create_tenant(&ctx, Tenant::new("dormant").with_active(false))
            .await
            .unwrap();
        TenantMiddleware::new(Arc::new(service), config)
    }

    fn request(path: &str, tenant: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri(path);
        if let Some(name) = tenant {
            builder = builder.header("x-tenant-id", name);
        }
        builder.body(()).unwrap()
    }

    fn ok() -> Next<()> {
        next_fn(|_req| async { Response::new(Bytes::from_static(b"ok")) })
    }

    #[tokio::test]
    async fn test_tenant_is_attached() {
        let middleware = middleware(TenantMiddlewareConfig::default()).await;

        let response = middleware
            .handle(
                request("/api/users", Some("acme")),
                next_fn(|req: Request<()>| async move {
                    assert_eq!(tenant(&req).map(|t| t.name.as_str()), Some("acme"));
                    Response::new(Bytes::new())
                }),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[TENANT_NAME_HEADER], "acme");
    }

    #[tokio::test]
    async fn test_missing_header_is_bad_request() {
        let middleware = middleware(TenantMiddlewareConfig::default()).await;
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();

        let response = middleware
            .handle(
                request("/api/users", None),
                next_fn(move |_req| async move {
                    flag.store(true, Ordering::SeqCst);
                    Response::new(Bytes::new())
                }),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_blank_header_is_missing() {
        let middleware = middleware(TenantMiddlewareConfig::default()).await;
        let response = middleware.handle(request("/", Some("  ")), ok()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_tenants() {
        let middleware = middleware(TenantMiddlewareConfig::default()).await;

        let response = middleware.handle(request("/", Some("ghost")), ok()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(TENANT_NAME_HEADER).is_none());

        let response = middleware.handle(request("/", Some("dormant")), ok()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_ignored_endpoint_skips_resolution() {
        let config = TenantMiddlewareConfig::default().with_ignored_endpoint("/health");
        let middleware = middleware(config).await;

        assert!(middleware.is_ignored("/health/live"));
        assert!(!middleware.is_ignored("/api/health"));

        let response = middleware.handle(request("/health/live", None), ok()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(TENANT_NAME_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_custom_header_name() {
        let config = TenantMiddlewareConfig::default().with_header_name("X-Org");
        let middleware = middleware(config).await;

        let req = Request::builder().uri("/").header("x-org", "acme").body(()).unwrap();
        let response = middleware.handle(req, ok()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_custom_error_handler() {
        let middleware = middleware(TenantMiddlewareConfig::default())
            .await
            .with_error_handler(|rejection| {
                let mut response = Response::new(Bytes::from(rejection.to_string()));
                *response.status_mut() = StatusCode::UNAUTHORIZED;
                response
            });

        let response = middleware.handle(request("/", Some("ghost")), ok()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.body(), "tenant not found: ghost");
    }

    #[tokio::test]
    async fn test_parent_context_is_kept() {
        let middleware = middleware(TenantMiddlewareConfig::default()).await;
        let parent = TenantContext::background().with_timeout(Duration::from_secs(30));
        let deadline = parent.deadline();

        let mut req = request("/", Some("acme"));
        req.extensions_mut().insert(parent);

        let ctx = middleware.resolve(&req).await.unwrap();
        assert_eq!(ctx.tenant_name(), Some("acme"));
        assert_eq!(ctx.deadline(), deadline);
    }
}
