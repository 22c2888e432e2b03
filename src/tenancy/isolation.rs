use serde_json::{Map, Value};
use tracing::{debug, error};

use super::error::TenancyError;
use super::model::{TenantContext, TenantId};
use crate::filter::SqlResult;

/// Column carrying the owning tenant on every tenant-owned table
pub const TENANT_COLUMN: &str = "tenant_id";

/// Tracing target for cross-tenant attempts and isolation failures
pub const SECURITY_TARGET: &str = "tenancy::security";

/// Tenant predicate every generated statement must start its WHERE clause with
pub const TENANT_PREDICATE: &str = "WHERE \"tenant_id\" = $1::uuid";

/// Proof that a data access is bound to one tenant.
///
/// Only obtainable from a resolved [`TenantContext`], so code that holds a
/// scope cannot have skipped resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: TenantId,
}

impl TenantScope {
    pub fn from_context(context: &TenantContext) -> Self {
        Self {
            tenant_id: *context.tenant_id(),
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn tenant_value(&self) -> Value {
        Value::String(self.tenant_id.to_string())
    }

    pub fn owns(&self, record: &Map<String, Value>) -> bool {
        record
            .get(TENANT_COLUMN)
            .and_then(Value::as_str)
            .and_then(TenantId::parse)
            .map(|owner| owner == self.tenant_id)
            .unwrap_or(false)
    }
}

impl From<&TenantContext> for TenantScope {
    fn from(context: &TenantContext) -> Self {
        Self::from_context(context)
    }
}

/// Last-line checks run by the stores around every tenant-owned access
pub struct IsolationEnforcer;

impl IsolationEnforcer {
    /// The statement must carry the tenant predicate bound to this scope's tenant
    pub fn check_query(scope: &TenantScope, sql: &SqlResult) -> Result<(), TenancyError> {
        if !sql.query.contains(TENANT_PREDICATE) {
            return Err(Self::violation(scope, "statement is missing the tenant predicate"));
        }

        let bound = sql
            .params
            .first()
            .and_then(Value::as_str)
            .and_then(TenantId::parse);
        if bound != Some(scope.tenant_id) {
            return Err(Self::violation(scope, "tenant parameter does not match the scope"));
        }

        Ok(())
    }

    /// Every returned row must belong to the scope's tenant
    pub fn check_rows(scope: &TenantScope, rows: &[Value]) -> Result<(), TenancyError> {
        for row in rows {
            let owned = row.as_object().map(|r| scope.owns(r)).unwrap_or(false);
            if !owned {
                return Err(Self::violation(scope, "store returned a row owned by another tenant"));
            }
        }
        Ok(())
    }

    /// Stamps the scope's tenant onto a record, discarding any caller-supplied owner
    pub fn prepare_write(scope: &TenantScope, mut record: Map<String, Value>) -> Map<String, Value> {
        if let Some(supplied) = record.remove(TENANT_COLUMN) {
            if supplied != scope.tenant_value() {
                debug!(
                    target: SECURITY_TARGET,
                    "Discarded caller-supplied tenant_id {} for tenant {}",
                    supplied,
                    scope.tenant_id
                );
            }
        }
        record.insert(TENANT_COLUMN.to_string(), scope.tenant_value());
        record
    }

    pub fn check_write(scope: &TenantScope, record: &Map<String, Value>) -> Result<(), TenancyError> {
        if scope.owns(record) {
            Ok(())
        } else {
            Err(Self::violation(scope, "write is not stamped with the scope's tenant"))
        }
    }

    fn violation(scope: &TenantScope, detail: &str) -> TenancyError {
        error!(
            target: SECURITY_TARGET,
            tenant = %scope.tenant_id,
            "Isolation violation: {}",
            detail
        );
        TenancyError::IsolationViolation(detail.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::model::TenantRecord;
    use serde_json::json;

    fn scope() -> (TenantRecord, TenantScope) {
        let acme = TenantRecord::new("acme", "Acme");
        let scope = TenantScope::from_context(&TenantContext::administrative(&acme));
        (acme, scope)
    }

    #[test]
    fn query_without_predicate_is_rejected() {
        let (_, scope) = scope();
        let sql = SqlResult {
            query: "SELECT * FROM \"users\"".to_string(),
            params: vec![],
        };
        assert!(matches!(
            IsolationEnforcer::check_query(&scope, &sql),
            Err(TenancyError::IsolationViolation(_))
        ));
    }

    #[test]
    fn query_bound_to_other_tenant_is_rejected() {
        let (_, scope) = scope();
        let other = TenantId::generate();
        let sql = SqlResult {
            query: format!("SELECT * FROM \"users\" {}", TENANT_PREDICATE),
            params: vec![json!(other.to_string())],
        };
        assert!(IsolationEnforcer::check_query(&scope, &sql).is_err());

        let sql = SqlResult {
            params: vec![scope.tenant_value()],
            ..sql
        };
        assert!(IsolationEnforcer::check_query(&scope, &sql).is_ok());
    }

    #[test]
    fn rows_must_belong_to_scope() {
        let (acme, scope) = scope();
        let mine = json!({ "id": "1", "tenant_id": acme.id.to_string() });
        let theirs = json!({ "id": "2", "tenant_id": TenantId::generate().to_string() });

        assert!(IsolationEnforcer::check_rows(&scope, &[mine.clone()]).is_ok());
        assert!(IsolationEnforcer::check_rows(&scope, &[mine, theirs]).is_err());
        assert!(IsolationEnforcer::check_rows(&scope, &[json!({ "id": "3" })]).is_err());
    }

    #[test]
    fn writes_are_stamped_with_scope() {
        let (acme, scope) = scope();
        let mut body = Map::new();
        body.insert("tenant_id".to_string(), json!(TenantId::generate().to_string()));
        body.insert("email".to_string(), json!("a@acme.com"));

        let record = IsolationEnforcer::prepare_write(&scope, body);
        assert_eq!(record["tenant_id"], json!(acme.id.to_string()));
        assert!(IsolationEnforcer::check_write(&scope, &record).is_ok());
    }
}
