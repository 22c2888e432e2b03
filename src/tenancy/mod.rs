//! Tenant identity, resolution, policy, isolation and quotas.

pub mod error;
pub mod isolation;
pub mod limits;
pub mod model;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod store;

pub use error::{ResolutionFailure, TenancyError};
pub use isolation::{IsolationEnforcer, TenantScope, SECURITY_TARGET, TENANT_COLUMN};
pub use limits::{Increment, LimitCheck, LimitTracker, MemoryUsageStore, UsageKey, UsageSnapshot, UsageStore};
pub use model::{
    Branding, ResolvedFrom, ResourceKind, TenantContext, TenantId, TenantRecord, TenantStatus,
};
pub use policy::{PolicyDecision, PolicyEvaluator, PolicyReason};
pub use registry::TenantRegistry;
pub use resolver::{ResolutionRequest, TenantResolver};
pub use store::{MemoryTenantStore, TenantStore};
