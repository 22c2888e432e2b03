pub mod auth;
pub mod feature;
pub mod response;
pub mod tenant;

pub use auth::{root_auth_middleware, RootUser};
pub use feature::{require_feature, FeatureGate};
pub use response::{ApiResponse, ApiResult};
pub use tenant::resolve_tenant_middleware;
