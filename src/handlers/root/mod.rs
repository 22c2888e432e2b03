// handlers/root/mod.rs - Operator routes under /api/root (root JWT required)
//
// Tenants are addressed by slug in the path; no tenant resolution runs here.

pub mod cache;
pub mod tenant;

use tracing::info;

use crate::app::AppState;
use crate::middleware::RootUser;
use crate::tenancy::SECURITY_TARGET;

/// Records an administrative action when audit logging is enabled
pub(crate) fn audit(state: &AppState, operator: &RootUser, action: &str, slug: &str) {
    if state.config.security.enable_audit_logging {
        info!(
            target: SECURITY_TARGET,
            operator = %operator.subject,
            action,
            tenant = slug,
            "Tenant administration"
        );
    }
}
