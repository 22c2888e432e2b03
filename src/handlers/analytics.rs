// handlers/analytics.rs - GET /api/analytics/summary (requires the "analytics" feature)

use std::collections::BTreeMap;

use axum::extract::State;
use futures::future::try_join_all;
use serde::Serialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{ResourceKind, TenantContext};

#[derive(Debug, Serialize)]
pub struct Summary {
    pub records: BTreeMap<ResourceKind, i64>,
    pub total: i64,
}

pub async fn summary(State(state): State<AppState>, context: TenantContext) -> ApiResult<Summary> {
    let counts = try_join_all(ResourceKind::ALL.iter().map(|&resource| {
        let repository = state.repository(&context, resource);
        async move { repository.count(None).await.map(|count| (resource, count)) }
    }))
    .await?;

    let records: BTreeMap<ResourceKind, i64> = counts.into_iter().collect();
    let total = records.values().sum();
    Ok(ApiResponse::success(Summary { records, total }).for_tenant(&context))
}
