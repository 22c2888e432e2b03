// handlers/root/tenant/show.rs - GET /api/root/tenant/:slug

use axum::extract::{Path, State};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::TenantRecord;

use super::TenantPath;

/// Reads through to the store so operators see writes the cache has not picked up
pub async fn show(State(state): State<AppState>, Path(path): Path<TenantPath>) -> ApiResult<TenantRecord> {
    let record = state.registry.load_by_slug(&path.slug).await?;
    Ok(ApiResponse::success(record))
}
