use thiserror::Error;

use super::model::{ResolvedFrom, ResourceKind, TenantStatus};

/// Why no tenant could be attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    /// No header, host, path segment or default named a tenant
    #[error("no tenant specified")]
    Missing,
    /// A request source named a tenant the registry does not know
    #[error("unknown tenant '{value}' from {origin}")]
    UnknownTenant { origin: ResolvedFrom, value: String },
}

#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("Tenant resolution failed: {0}")]
    Resolution(ResolutionFailure),

    #[error("Tenant '{slug}' is {status}")]
    TenantInactive { slug: String, status: TenantStatus },

    #[error("Feature '{feature}' is not enabled for tenant '{slug}'")]
    FeatureDisabled { slug: String, feature: String },

    #[error("Isolation violation: {0}")]
    IsolationViolation(String),

    #[error("Limit exceeded for {resource}: {current}/{max}")]
    LimitExceeded {
        resource: ResourceKind,
        current: u64,
        max: u64,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl TenancyError {
    pub fn missing_tenant() -> Self {
        TenancyError::Resolution(ResolutionFailure::Missing)
    }

    pub fn unknown_tenant(origin: ResolvedFrom, value: impl Into<String>) -> Self {
        TenancyError::Resolution(ResolutionFailure::UnknownTenant {
            origin,
            value: value.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_failures_render_their_origin() {
        assert_eq!(TenancyError::missing_tenant().to_string(), "Tenant resolution failed: no tenant specified");
        assert_eq!(
            TenancyError::unknown_tenant(ResolvedFrom::PathParam, "nobody").to_string(),
            "Tenant resolution failed: unknown tenant 'nobody' from path"
        );

        let failure: &dyn std::error::Error = &ResolutionFailure::Missing;
        assert!(failure.source().is_none());
    }
}
