// handlers/tenant.rs - Profile, usage and feature checks for the resolved tenant

use axum::extract::{Path, State};
use serde::Deserialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{PolicyDecision, TenantContext, TenantRecord, UsageSnapshot};

/// GET /api/tenant
pub async fn profile(State(state): State<AppState>, context: TenantContext) -> ApiResult<TenantRecord> {
    let record = state.registry.get_by_id(context.tenant_id()).await?;
    Ok(ApiResponse::success(TenantRecord::clone(&record)).for_tenant(&context))
}

/// GET /api/tenant/usage
pub async fn usage(State(state): State<AppState>, context: TenantContext) -> ApiResult<Vec<UsageSnapshot>> {
    let usage = state.limits.usage(context.tenant_id()).await?;
    Ok(ApiResponse::success(usage).for_tenant(&context))
}

#[derive(Debug, Deserialize)]
pub struct FeaturePath {
    feature: String,
}

/// GET /api/tenant/features/:feature
///
/// Reports the decision instead of failing, so clients can hide what they may not use.
pub async fn feature(
    State(state): State<AppState>,
    context: TenantContext,
    Path(path): Path<FeaturePath>,
) -> ApiResult<PolicyDecision> {
    let decision = state.policy.evaluate(context.tenant_id(), &path.feature).await?;
    Ok(ApiResponse::success(decision).for_tenant(&context))
}
