// handlers/root/tenant/create.rs - POST /api/root/tenant

use std::collections::{BTreeMap, BTreeSet};

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, RootUser};
use crate::tenancy::{Branding, ResourceKind, TenantRecord, TenantStatus};

use super::super::audit;

/// Body of a tenant creation. The id and timestamps are assigned by the server.
#[derive(Debug, Deserialize)]
pub struct CreateTenant {
    pub slug: String,
    pub display_name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub status: Option<TenantStatus>,
    #[serde(default)]
    pub features: BTreeSet<String>,
    #[serde(default)]
    pub limits: BTreeMap<ResourceKind, i64>,
    #[serde(default)]
    pub branding: Branding,
}

impl From<CreateTenant> for TenantRecord {
    fn from(body: CreateTenant) -> Self {
        let mut record = TenantRecord::new(body.slug, body.display_name);
        record.domain = body.domain;
        record.status = body.status.unwrap_or(TenantStatus::Active);
        record.features = body.features;
        record.limits = body.limits;
        record.branding = body.branding;
        record
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(operator): Extension<RootUser>,
    Json(body): Json<CreateTenant>,
) -> ApiResult<TenantRecord> {
    let slug = body.slug.trim().to_string();
    let record = state
        .registry
        .create(TenantRecord::from(CreateTenant { slug, ..body }))
        .await?;
    audit(&state, &operator, "tenant.create", &record.slug);

    Ok(ApiResponse::created(record))
}
