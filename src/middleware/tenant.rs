use axum::{
    async_trait,
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::error;

use crate::app::AppState;
use crate::error::ApiError;
use crate::tenancy::{ResolutionRequest, TenancyError, TenantContext, SECURITY_TARGET};

/// Resolves the request's tenant and attaches the [`TenantContext`]
pub async fn resolve_tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Copy what resolution needs so nothing borrows the request across the await
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string));
    let tenant_header = request
        .headers()
        .get(state.resolver.header_name())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let context = state
        .resolver
        .resolve(&ResolutionRequest {
            host: host.as_deref(),
            tenant_header: tenant_header.as_deref(),
            path: &path,
        })
        .await?;

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Handlers take the context as an extractor; reaching one without a
/// resolved tenant is a wiring bug and fails closed.
#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<TenantContext>().cloned().ok_or_else(|| {
            error!(
                target: SECURITY_TARGET,
                path = %parts.uri.path(),
                "Tenant-scoped handler reached without a resolved tenant"
            );
            TenancyError::IsolationViolation("missing tenant context".to_string()).into()
        })
    }
}
