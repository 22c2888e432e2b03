// handlers/root/tenant/list.rs - GET /api/root/tenant

use axum::extract::{Query, State};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{TenantRecord, TenantStatus};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Only tenants in this status, e.g. `?status=active`
    pub status: Option<String>,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Vec<TenantRecord>> {
    let tenants = match query.status.as_deref() {
        None => state.registry.list_all().await?,
        Some("active") => state.registry.list_active().await?,
        Some(other) => {
            let status: TenantStatus = other.parse().map_err(ApiError::bad_request)?;
            state
                .registry
                .list_all()
                .await?
                .into_iter()
                .filter(|t| t.status == status)
                .collect()
        }
    };

    Ok(ApiResponse::success(
        tenants.iter().map(|t| TenantRecord::clone(t)).collect(),
    ))
}
