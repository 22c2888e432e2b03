use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::error::TenancyError;
use super::model::{TenantContext, TenantId, TenantRecord};
use super::registry::TenantRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PolicyReason {
    #[serde(rename = "allowed")]
    Allowed,
    #[serde(rename = "tenant inactive")]
    TenantInactive,
    #[serde(rename = "feature not enabled")]
    FeatureNotEnabled,
}

impl PolicyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyReason::Allowed => "allowed",
            PolicyReason::TenantInactive => "tenant inactive",
            PolicyReason::FeatureNotEnabled => "feature not enabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub capability: String,
    pub allowed: bool,
    pub reason: PolicyReason,
}

impl PolicyDecision {
    fn new(capability: &str, reason: PolicyReason) -> Self {
        Self {
            capability: capability.to_string(),
            allowed: reason == PolicyReason::Allowed,
            reason,
        }
    }
}

/// Decides whether a tenant may use a named capability
pub struct PolicyEvaluator {
    registry: Arc<TenantRegistry>,
}

impl PolicyEvaluator {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        Self { registry }
    }

    /// Pure decision over a record; status is checked before features
    pub fn evaluate_record(record: &TenantRecord, capability: &str) -> PolicyDecision {
        let reason = if !record.is_active() {
            PolicyReason::TenantInactive
        } else if !record.has_feature(capability) {
            PolicyReason::FeatureNotEnabled
        } else {
            PolicyReason::Allowed
        };
        PolicyDecision::new(capability, reason)
    }

    pub async fn evaluate(&self, tenant_id: &TenantId, capability: &str) -> Result<PolicyDecision, TenancyError> {
        let record = self.registry.get_by_id(tenant_id).await?;
        Ok(Self::evaluate_record(&record, capability))
    }

    /// Fails with the error matching the denial reason
    pub async fn enforce(&self, context: &TenantContext, capability: &str) -> Result<(), TenancyError> {
        let record = self.registry.get_by_id(context.tenant_id()).await?;
        let decision = Self::evaluate_record(&record, capability);
        debug!(
            "Policy {} for tenant {}: {}",
            capability,
            record.slug,
            decision.reason.as_str()
        );

        match decision.reason {
            PolicyReason::Allowed => Ok(()),
            PolicyReason::TenantInactive => Err(TenancyError::TenantInactive {
                slug: record.slug.clone(),
                status: record.status,
            }),
            PolicyReason::FeatureNotEnabled => Err(TenancyError::FeatureDisabled {
                slug: record.slug.clone(),
                feature: capability.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::model::TenantStatus;
    use crate::tenancy::store::MemoryTenantStore;
    use std::time::Duration;

    #[test]
    fn suspended_tenant_is_denied_everything() {
        let record = TenantRecord::new("acme", "Acme")
            .with_feature("job-posting")
            .with_status(TenantStatus::Suspended);

        let decision = PolicyEvaluator::evaluate_record(&record, "job-posting");
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_str(), "tenant inactive");
    }

    #[test]
    fn feature_must_be_enabled() {
        let record = TenantRecord::new("acme", "Acme").with_feature("job-posting");

        assert!(PolicyEvaluator::evaluate_record(&record, "job-posting").allowed);
        let denied = PolicyEvaluator::evaluate_record(&record, "analytics");
        assert_eq!(denied.reason, PolicyReason::FeatureNotEnabled);
        assert_eq!(
            serde_json::to_value(&denied).unwrap()["reason"],
            "feature not enabled"
        );
    }

    #[tokio::test]
    async fn enforce_maps_denials_to_errors() {
        let acme = TenantRecord::new("acme", "Acme").with_feature("polls");
        let store = MemoryTenantStore::with_tenants(vec![acme.clone()]).unwrap();
        let registry = Arc::new(TenantRegistry::new(Arc::new(store), Duration::from_secs(60)));
        let policy = PolicyEvaluator::new(registry);
        let context = TenantContext::administrative(&acme);

        assert!(policy.enforce(&context, "polls").await.is_ok());
        assert!(matches!(
            policy.enforce(&context, "analytics").await,
            Err(TenancyError::FeatureDisabled { .. })
        ));
    }
}
