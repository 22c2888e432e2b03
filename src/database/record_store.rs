use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::warn;

use crate::database::manager::DatabaseError;
use crate::database::query_builder::QueryBuilder;
use crate::database::usage_store::{decrement_in, increment_in, lock_in, set_in};
use crate::filter::Filter;
use crate::tenancy::limits::{decrement_by, increment_with_ceiling};
use crate::tenancy::{
    Increment, IsolationEnforcer, MemoryUsageStore, ResourceKind, TenantScope, UsageKey, TENANT_COLUMN,
};

/// Result of a counted insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// Stored, and the usage counter now reads `current`
    Created { record: Value, current: u64 },
    /// Nothing stored: the counter already sits at the ceiling
    LimitReached { current: u64 },
}

/// Storage for tenant-owned records. Every call is bound to a tenant scope.
///
/// Writes keep the tenant's usage counter in step: an insert and its
/// increment, a delete and its decrement, land together or not at all.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, filter: &Filter) -> Result<Vec<Value>, DatabaseError>;

    async fn count(&self, filter: &Filter) -> Result<i64, DatabaseError>;

    /// Inserts a record already stamped with the scope's tenant, counting it
    /// against `max` (`None` means unlimited)
    async fn insert(
        &self,
        scope: &TenantScope,
        resource: ResourceKind,
        record: Map<String, Value>,
        max: Option<u64>,
    ) -> Result<InsertOutcome, DatabaseError>;

    /// Deletes every record matching the filter, returning them
    async fn delete(&self, filter: &Filter) -> Result<Vec<Value>, DatabaseError>;

    /// Resets the usage counter to the number of stored records and returns it
    async fn recount(&self, scope: &TenantScope, resource: ResourceKind) -> Result<u64, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

fn unique_conflict(resource: ResourceKind) -> String {
    format!(
        "A {} record with the same {} already exists",
        resource,
        resource.unique_fields().join(", ")
    )
}

fn log_drift(scope: &TenantScope, resource: ResourceKind, counted: u64, actual: u64) {
    if counted != actual {
        warn!(
            "Usage drift for tenant {} on {}: counter {} but {} stored",
            scope.tenant_id(),
            resource,
            counted,
            actual
        );
    }
}

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn select(&self, filter: &Filter) -> Result<Vec<Value>, DatabaseError> {
        QueryBuilder::new(filter).select_all(&self.pool).await
    }

    async fn count(&self, filter: &Filter) -> Result<i64, DatabaseError> {
        QueryBuilder::new(filter).count(&self.pool).await
    }

    async fn insert(
        &self,
        scope: &TenantScope,
        resource: ResourceKind,
        record: Map<String, Value>,
        max: Option<u64>,
    ) -> Result<InsertOutcome, DatabaseError> {
        IsolationEnforcer::check_write(scope, &record)?;
        let key = UsageKey::new(*scope.tenant_id(), resource);

        // Dropping the transaction uncommitted rolls the increment back
        let mut tx = self.pool.begin().await?;

        let current = match increment_in(&mut tx, key, max).await? {
            Increment::Applied(current) => current,
            Increment::Denied(current) => return Ok(InsertOutcome::LimitReached { current }),
        };

        let query = format!(
            "INSERT INTO \"{table}\" SELECT * FROM jsonb_populate_record(NULL::\"{table}\", $1) \
             RETURNING row_to_json(\"{table}\".*) AS row",
            table = resource.table_name()
        );
        let row = sqlx::query(&query)
            .bind(Value::Object(record))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from_write(e, || unique_conflict(resource)))?;
        let record = row.try_get::<Value, _>("row")?;

        tx.commit().await?;
        Ok(InsertOutcome::Created { record, current })
    }

    async fn delete(&self, filter: &Filter) -> Result<Vec<Value>, DatabaseError> {
        let key = UsageKey::new(*filter.scope().tenant_id(), filter.resource());
        let mut tx = self.pool.begin().await?;

        lock_in(&mut tx, key).await?;
        let deleted = QueryBuilder::new(filter).delete_all(&mut *tx).await?;
        if !deleted.is_empty() {
            decrement_in(&mut tx, key, deleted.len() as u64).await?;
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn recount(&self, scope: &TenantScope, resource: ResourceKind) -> Result<u64, DatabaseError> {
        let key = UsageKey::new(*scope.tenant_id(), resource);
        let mut tx = self.pool.begin().await?;

        // The row lock holds back counted inserts and deletes until the reset commits
        let counted = lock_in(&mut tx, key).await?;
        let actual = QueryBuilder::new(&Filter::new(scope, resource))
            .count(&mut *tx)
            .await?
            .max(0) as u64;
        set_in(&mut tx, key, actual).await?;

        tx.commit().await?;
        log_drift(scope, resource, counted, actual);
        Ok(actual)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Process-local record storage used when no database is configured.
///
/// Counted writes hold the table lock across the row change and the counter
/// update, so recounts never interleave with them.
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<ResourceKind, Vec<Map<String, Value>>>>,
    usage: Arc<MemoryUsageStore>,
}

impl MemoryRecordStore {
    pub fn new(usage: Arc<MemoryUsageStore>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            usage,
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select(&self, filter: &Filter) -> Result<Vec<Value>, DatabaseError> {
        let tables = self.tables.read().await;
        let rows = tables.get(&filter.resource()).map(|t| t.as_slice()).unwrap_or_default();
        Ok(filter.apply(rows)?.into_iter().map(Value::Object).collect())
    }

    async fn count(&self, filter: &Filter) -> Result<i64, DatabaseError> {
        let tables = self.tables.read().await;
        let mut count = 0;
        for row in tables.get(&filter.resource()).into_iter().flatten() {
            if filter.matches(row)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert(
        &self,
        scope: &TenantScope,
        resource: ResourceKind,
        record: Map<String, Value>,
        max: Option<u64>,
    ) -> Result<InsertOutcome, DatabaseError> {
        IsolationEnforcer::check_write(scope, &record)?;
        let counter = self.usage.counter(UsageKey::new(*scope.tenant_id(), resource)).await;

        let mut tables = self.tables.write().await;
        let table = tables.entry(resource).or_default();

        let current = match increment_with_ceiling(&counter, max) {
            Increment::Applied(current) => current,
            Increment::Denied(current) => return Ok(InsertOutcome::LimitReached { current }),
        };

        for field in resource.unique_fields() {
            let Some(value) = record.get(*field).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = table
                .iter()
                .any(|row| row.get(TENANT_COLUMN) == record.get(TENANT_COLUMN) && row.get(*field) == Some(value));
            if taken {
                decrement_by(&counter, 1);
                return Err(DatabaseError::Conflict(unique_conflict(resource)));
            }
        }

        table.push(record.clone());
        Ok(InsertOutcome::Created {
            record: Value::Object(record),
            current,
        })
    }

    async fn delete(&self, filter: &Filter) -> Result<Vec<Value>, DatabaseError> {
        let counter = self
            .usage
            .counter(UsageKey::new(*filter.scope().tenant_id(), filter.resource()))
            .await;

        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&filter.resource()) else {
            return Ok(vec![]);
        };

        let mut matched = Vec::with_capacity(table.len());
        for row in table.iter() {
            matched.push(filter.matches(row)?);
        }

        let mut matched = matched.into_iter();
        let mut deleted = vec![];
        table.retain(|row| {
            if matched.next() == Some(true) {
                deleted.push(Value::Object(row.clone()));
                false
            } else {
                true
            }
        });

        decrement_by(&counter, deleted.len() as u64);
        Ok(deleted)
    }

    async fn recount(&self, scope: &TenantScope, resource: ResourceKind) -> Result<u64, DatabaseError> {
        let counter = self.usage.counter(UsageKey::new(*scope.tenant_id(), resource)).await;
        let filter = Filter::new(scope, resource);

        let tables = self.tables.write().await;
        let mut actual = 0;
        for row in tables.get(&resource).into_iter().flatten() {
            if filter.matches(row)? {
                actual += 1;
            }
        }
        let counted = counter.swap(actual, Ordering::AcqRel);
        drop(tables);

        log_drift(scope, resource, counted, actual);
        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::{TenantContext, TenantRecord, UsageStore};
    use serde_json::json;

    fn scope(slug: &str) -> TenantScope {
        TenantScope::from_context(&TenantContext::administrative(&TenantRecord::new(slug, slug)))
    }

    fn user(scope: &TenantScope, id: &str, email: &str) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("id".to_string(), json!(id));
        body.insert("email".to_string(), json!(email));
        IsolationEnforcer::prepare_write(scope, body)
    }

    fn store() -> (MemoryRecordStore, Arc<MemoryUsageStore>) {
        let usage = Arc::new(MemoryUsageStore::new());
        (MemoryRecordStore::new(usage.clone()), usage)
    }

    fn users_of(scope: &TenantScope) -> UsageKey {
        UsageKey::new(*scope.tenant_id(), ResourceKind::Users)
    }

    #[tokio::test]
    async fn email_is_unique_per_tenant_only() {
        let (store, usage) = store();
        let (acme, globex) = (scope("acme"), scope("globex"));

        store.insert(&acme, ResourceKind::Users, user(&acme, "1", "a@x.com"), None).await.unwrap();
        store.insert(&globex, ResourceKind::Users, user(&globex, "2", "a@x.com"), None).await.unwrap();

        let err = store
            .insert(&acme, ResourceKind::Users, user(&acme, "3", "a@x.com"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));

        // The rejected insert gave its slot back
        assert_eq!(usage.current(users_of(&acme)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn insert_rejects_foreign_stamp() {
        let (store, usage) = store();
        let (acme, globex) = (scope("acme"), scope("globex"));

        let err = store
            .insert(&acme, ResourceKind::Users, user(&globex, "1", "a@x.com"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Tenancy(_)));
        assert_eq!(usage.current(users_of(&acme)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_at_the_ceiling_stores_nothing() {
        let (store, usage) = store();
        let acme = scope("acme");

        let first = store
            .insert(&acme, ResourceKind::Users, user(&acme, "1", "a@x.com"), Some(1))
            .await
            .unwrap();
        assert!(matches!(first, InsertOutcome::Created { current: 1, .. }));

        let second = store
            .insert(&acme, ResourceKind::Users, user(&acme, "2", "b@x.com"), Some(1))
            .await
            .unwrap();
        assert_eq!(second, InsertOutcome::LimitReached { current: 1 });

        assert_eq!(store.count(&Filter::new(&acme, ResourceKind::Users)).await.unwrap(), 1);
        assert_eq!(usage.current(users_of(&acme)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn select_count_and_delete_stay_in_scope() {
        let (store, usage) = store();
        let (acme, globex) = (scope("acme"), scope("globex"));
        store.insert(&acme, ResourceKind::Users, user(&acme, "1", "a@acme.com"), None).await.unwrap();
        store.insert(&globex, ResourceKind::Users, user(&globex, "2", "a@globex.com"), None).await.unwrap();

        let filter = Filter::new(&acme, ResourceKind::Users);
        assert_eq!(store.select(&filter).await.unwrap().len(), 1);
        assert_eq!(store.count(&filter).await.unwrap(), 1);

        // Deleting globex's id from acme's scope removes nothing
        let mut filter = Filter::new(&acme, ResourceKind::Users);
        filter.where_clause(json!({ "id": "2" })).unwrap();
        assert!(store.delete(&filter).await.unwrap().is_empty());
        assert_eq!(store.count(&Filter::new(&globex, ResourceKind::Users)).await.unwrap(), 1);
        assert_eq!(usage.current(users_of(&globex)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_decrements_by_rows_removed() {
        let (store, usage) = store();
        let acme = scope("acme");
        for i in 0..3 {
            let email = format!("{}@acme.com", i);
            store
                .insert(&acme, ResourceKind::Users, user(&acme, &i.to_string(), &email), None)
                .await
                .unwrap();
        }

        let mut filter = Filter::new(&acme, ResourceKind::Users);
        filter.where_clause(json!({ "id": { "$in": ["0", "1"] } })).unwrap();
        assert_eq!(store.delete(&filter).await.unwrap().len(), 2);
        assert_eq!(usage.current(users_of(&acme)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recount_resets_the_counter_to_stored_rows() {
        let (store, usage) = store();
        let (acme, globex) = (scope("acme"), scope("globex"));
        store.insert(&acme, ResourceKind::Users, user(&acme, "1", "a@acme.com"), None).await.unwrap();
        store.insert(&globex, ResourceKind::Users, user(&globex, "2", "a@globex.com"), None).await.unwrap();

        // Drift from reservations that never became records
        for _ in 0..4 {
            usage.try_increment(users_of(&acme), None).await.unwrap();
        }
        assert_eq!(usage.current(users_of(&acme)).await.unwrap(), 5);

        assert_eq!(store.recount(&acme, ResourceKind::Users).await.unwrap(), 1);
        assert_eq!(usage.current(users_of(&acme)).await.unwrap(), 1);
        assert_eq!(usage.current(users_of(&globex)).await.unwrap(), 1);
    }
}
