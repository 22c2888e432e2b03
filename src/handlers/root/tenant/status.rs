// handlers/root/tenant/status.rs - Lifecycle transitions
//
// DELETE   /api/root/tenant/:slug          -> inactive (tenants are never hard-deleted)
// POST     /api/root/tenant/:slug/suspend  -> suspended
// PUT      /api/root/tenant/:slug          -> active

use axum::extract::{Extension, Path, State};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, RootUser};
use crate::tenancy::{TenantRecord, TenantStatus};

use super::super::audit;
use super::TenantPath;

async fn transition(
    state: &AppState,
    operator: &RootUser,
    slug: &str,
    status: TenantStatus,
) -> ApiResult<TenantRecord> {
    let record = state
        .registry
        .update(slug, |record| {
            record.status = status;
            Ok(())
        })
        .await?;
    audit(state, operator, &format!("tenant.{}", status), &record.slug);

    Ok(ApiResponse::success(record))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(operator): Extension<RootUser>,
    Path(path): Path<TenantPath>,
) -> ApiResult<TenantRecord> {
    transition(&state, &operator, &path.slug, TenantStatus::Inactive).await
}

pub async fn suspend(
    State(state): State<AppState>,
    Extension(operator): Extension<RootUser>,
    Path(path): Path<TenantPath>,
) -> ApiResult<TenantRecord> {
    transition(&state, &operator, &path.slug, TenantStatus::Suspended).await
}

pub async fn restore(
    State(state): State<AppState>,
    Extension(operator): Extension<RootUser>,
    Path(path): Path<TenantPath>,
) -> ApiResult<TenantRecord> {
    transition(&state, &operator, &path.slug, TenantStatus::Active).await
}
