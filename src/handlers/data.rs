// handlers/data.rs - Tenant-scoped record CRUD and find
//
// Every handler runs resolve -> policy -> (limit) -> scoped repository call.
// Tenant identity comes from the TenantContext only; tenant_id in a body or
// query string is never read.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{ResourceKind, TenantContext};

use super::resource_kind;

#[derive(Debug, Deserialize)]
pub struct ResourcePath {
    resource: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordPath {
    resource: String,
    id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// JSON-encoded where clause, e.g. `where={"status":"open"}`
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    /// Comma-separated `column [asc|desc]` list
    pub order: Option<String>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
    /// Comma-separated relation fields to expand
    pub populate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShowQuery {
    pub populate: Option<String>,
}

fn split_populate(populate: Option<&str>) -> Vec<String> {
    populate
        .map(|p| {
            p.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Checks the capability guarding a resource kind, if it has one
async fn authorize(state: &AppState, context: &TenantContext, resource: ResourceKind) -> Result<(), ApiError> {
    if let Some(feature) = resource.required_feature() {
        state.policy.enforce(context, feature).await?;
    }
    Ok(())
}

/// GET /api/data/:resource
pub async fn list(
    State(state): State<AppState>,
    context: TenantContext,
    Path(path): Path<ResourcePath>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Value>> {
    let resource = resource_kind(&path.resource)?;
    authorize(&state, &context, resource).await?;

    let where_clause = match query.where_clause.as_deref() {
        Some(raw) => Some(
            serde_json::from_str::<Value>(raw)
                .map_err(|e| ApiError::bad_request(format!("Invalid where parameter: {}", e)))?,
        ),
        None => None,
    };
    let populate = split_populate(query.populate.as_deref());

    let filter_data = FilterData {
        where_clause,
        order: query.order.map(Value::String),
        limit: query.limit,
        offset: query.offset,
        populate: (!populate.is_empty()).then_some(populate),
        ..Default::default()
    };

    let records = state.repository(&context, resource).select_any(filter_data).await?;
    Ok(ApiResponse::success(records).for_tenant(&context))
}

/// POST /api/find/:resource - filtered search with a FilterData body
pub async fn find(
    State(state): State<AppState>,
    context: TenantContext,
    Path(path): Path<ResourcePath>,
    Json(filter_data): Json<FilterData>,
) -> ApiResult<Vec<Value>> {
    let resource = resource_kind(&path.resource)?;
    authorize(&state, &context, resource).await?;

    let records = state.repository(&context, resource).select_any(filter_data).await?;
    Ok(ApiResponse::success(records).for_tenant(&context))
}

/// GET /api/data/:resource/:id
pub async fn show(
    State(state): State<AppState>,
    context: TenantContext,
    Path(path): Path<RecordPath>,
    Query(query): Query<ShowQuery>,
) -> ApiResult<Value> {
    let resource = resource_kind(&path.resource)?;
    authorize(&state, &context, resource).await?;

    let populate = split_populate(query.populate.as_deref());
    let record = state
        .repository(&context, resource)
        .select_404(&path.id, &populate)
        .await?;
    Ok(ApiResponse::success(record).for_tenant(&context))
}

/// POST /api/data/:resource
///
/// The insert is counted against the tenant's limit in the same unit of work,
/// so a failed insert never consumes a slot.
pub async fn create(
    State(state): State<AppState>,
    context: TenantContext,
    Path(path): Path<ResourcePath>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    let resource = resource_kind(&path.resource)?;
    authorize(&state, &context, resource).await?;

    let record: Map<String, Value> = match body {
        Value::Object(map) => map,
        _ => return Err(ApiError::bad_request("Request body must be a JSON object")),
    };

    let max = state.limits.ceiling(context.tenant_id(), resource).await?;
    let created = state
        .repository(&context, resource)
        .with_limit(max)
        .create(record)
        .await?;

    info!("Created {} for tenant {}", resource, context.slug());
    Ok(ApiResponse::created(created).for_tenant(&context))
}

/// DELETE /api/data/:resource/:id
pub async fn remove(
    State(state): State<AppState>,
    context: TenantContext,
    Path(path): Path<RecordPath>,
) -> ApiResult<Value> {
    let resource = resource_kind(&path.resource)?;
    authorize(&state, &context, resource).await?;

    let deleted = state.repository(&context, resource).delete_404(&path.id).await?;
    Ok(ApiResponse::success(deleted).for_tenant(&context))
}
