// handlers/root/cache.rs - POST /api/root/cache/invalidate

use axum::extract::{Extension, State};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, RootUser};

use super::audit;

/// Drops the registry snapshot so the next lookup reloads from the store
pub async fn invalidate(
    State(state): State<AppState>,
    Extension(operator): Extension<RootUser>,
) -> ApiResult<Value> {
    state.registry.invalidate();
    audit(&state, &operator, "cache.invalidate", "*");
    Ok(ApiResponse::success(json!({ "invalidated": true })))
}
