// handlers/mod.rs - Route handlers grouped by access tier
//
// system:     public, no tenant (/, /health)
// tenant,
// data,
// analytics:  tenant-scoped, behind the resolver (/api/*, /:tenant/api/*)
// root:       operator routes, root JWT required (/api/root/*)

pub mod analytics;
pub mod data;
pub mod root;
pub mod system;
pub mod tenant;

use crate::error::ApiError;
use crate::tenancy::ResourceKind;

/// Parses the `:resource` path segment
pub(crate) fn resource_kind(name: &str) -> Result<ResourceKind, ApiError> {
    name.parse::<ResourceKind>().map_err(ApiError::not_found)
}
