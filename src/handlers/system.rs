// handlers/system.rs - GET / and GET /health

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Tenancy API (Rust)",
            "version": version,
            "description": "Tenant resolution, isolation and quota enforcement over a multi-tenant record API",
            "tenant_header": state.resolver.header_name(),
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "tenant": "/api/tenant[/usage|/features/:feature] (tenant-scoped)",
                "data": "/api/data/:resource[/:id] (tenant-scoped)",
                "find": "/api/find/:resource (tenant-scoped)",
                "analytics": "/api/analytics/summary (tenant-scoped, 'analytics' feature)",
                "path_tenancy": "/:tenant/api/* (when path resolution is enabled)",
                "root": "/api/root/* (root JWT required)",
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    let registry = state.registry.health_check().await;
    let records = state.records.health_check().await;

    match (registry, records) {
        (Ok(()), Ok(())) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "tenants": "ok",
                    "records": "ok"
                }
            })),
        ),
        (registry, records) => {
            let registry_error = registry.err().map(|e| e.to_string());
            let records_error = records.err().map(|e| e.to_string());
            tracing::warn!(
                "Health check degraded: tenants={:?} records={:?}",
                registry_error,
                records_error
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "backing store unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "tenants_error": registry_error,
                        "records_error": records_error
                    }
                })),
            )
        }
    }
}
