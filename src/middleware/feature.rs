use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::tenancy::{PolicyEvaluator, TenantContext};

/// Route-level requirement that the resolved tenant has a capability enabled
#[derive(Clone)]
pub struct FeatureGate {
    policy: Arc<PolicyEvaluator>,
    feature: &'static str,
}

impl FeatureGate {
    pub fn new(policy: Arc<PolicyEvaluator>, feature: &'static str) -> Self {
        Self { policy, feature }
    }
}

pub async fn require_feature(
    State(gate): State<FeatureGate>,
    context: TenantContext,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate.policy.enforce(&context, gate.feature).await?;

    request
        .extensions_mut()
        .insert(context.with_capability(gate.feature));
    Ok(next.run(request).await)
}
