//! HTTP tenant resolution for Tenantry
//!
//! Framework-agnostic middleware over the `http` crate's request and
//! response types. Each request names its tenant in a header (default
//! `X-Tenant-Id`); the middleware resolves it through
//! [`tenantry_core::TenantService`] and stores a
//! [`tenantry_core::TenantContext`] in the request extensions.
//!
//! | Outcome | Status |
//! |---------|--------|
//! | header missing or blank | 400 |
//! | tenant unknown | 404 |
//! | tenant inactive | 403 |
//! | anything else | 500, details hidden |
//!
//! ```rust,ignore
//! use tenantry_http::{TenantMiddleware, TenantMiddlewareConfig, next_fn, tenant};
//!
//! let middleware = TenantMiddleware::new(service, TenantMiddlewareConfig::default().with_ignored_endpoint("/health"));
//! let response = middleware
//!     .handle(request, next_fn(|req| async move { render(tenant(&req)) }))
//!     .await;
//! ```

pub mod middleware;
pub mod rejection;

pub use middleware::{
    BoxResponseFuture, ErrorHandler, Next, TENANT_NAME_HEADER, TenantMiddleware, TenantMiddlewareConfig, next_fn,
    tenant, tenant_context,
};
pub use rejection::TenantRejection;
