// handlers/root/tenant/usage.rs - Usage counters for one tenant

use axum::extract::{Extension, Path, State};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, RootUser};
use crate::tenancy::{ResourceKind, TenantContext, UsageSnapshot};

use super::super::audit;
use super::TenantPath;

/// GET /api/root/tenant/:slug/usage
pub async fn usage(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
) -> ApiResult<Vec<UsageSnapshot>> {
    let record = state.registry.get_by_slug(&path.slug).await?;
    Ok(ApiResponse::success(state.limits.usage(&record.id).await?))
}

/// POST /api/root/tenant/:slug/recount
///
/// Resets every counter to the number of records actually stored. Each kind
/// is recounted in one unit of work, so creates racing the recount are either
/// counted by it or applied after it.
pub async fn recount(
    State(state): State<AppState>,
    Extension(operator): Extension<RootUser>,
    Path(path): Path<TenantPath>,
) -> ApiResult<Vec<UsageSnapshot>> {
    let record = state.registry.get_by_slug(&path.slug).await?;
    let context = TenantContext::administrative(&record);

    for resource in ResourceKind::ALL {
        state.repository(&context, resource).recount().await?;
    }
    audit(&state, &operator, "tenant.recount", &record.slug);

    Ok(ApiResponse::success(state.limits.usage(&record.id).await?))
}
