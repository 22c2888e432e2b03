use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::record_store::{InsertOutcome, RecordStore};
use crate::filter::{Filter, FilterData, FilterError};
use crate::tenancy::model::Relation;
use crate::tenancy::{IsolationEnforcer, ResourceKind, TenancyError, TenantScope};

/// Tenant-scoped access to one resource kind.
///
/// Every read re-verifies row ownership, and populated relations are fetched
/// with their own scoped queries so a reference can never reach another tenant.
pub struct Repository {
    store: Arc<dyn RecordStore>,
    resource: ResourceKind,
    scope: TenantScope,
    limit: Option<u64>,
}

impl Repository {
    pub fn new(store: Arc<dyn RecordStore>, resource: ResourceKind, scope: TenantScope) -> Self {
        Self {
            store,
            resource,
            scope,
            limit: None,
        }
    }

    /// Caps how many records of this kind the tenant may hold
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    fn filter(&self) -> Filter {
        Filter::new(&self.scope, self.resource)
    }

    pub async fn select_any(&self, filter_data: FilterData) -> Result<Vec<Value>, DatabaseError> {
        let relations = self.relations(filter_data.populate.as_deref().unwrap_or_default())?;

        let mut filter = self.filter();
        filter.assign(filter_data)?;

        let rows = self.store.select(&filter).await?;
        IsolationEnforcer::check_rows(&self.scope, &rows)?;
        self.populate(rows, &relations).await
    }

    pub async fn select_404(&self, id: &str, populate: &[String]) -> Result<Value, DatabaseError> {
        let filter_data = FilterData {
            where_clause: Some(json!({ "id": id })),
            limit: Some(1),
            populate: Some(populate.to_vec()),
            ..Default::default()
        };

        self.select_any(filter_data)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::NotFound(format!("{} record '{}' not found", self.resource, id)))
    }

    pub async fn count(&self, where_clause: Option<Value>) -> Result<i64, DatabaseError> {
        let mut filter = self.filter();
        if let Some(where_clause) = where_clause {
            filter.where_clause(where_clause)?;
        }
        self.store.count(&filter).await
    }

    /// Inserts a record owned by the scope's tenant. Server-managed fields
    /// (id, tenant_id, timestamps) in the body are replaced. The insert and
    /// its usage increment commit together.
    pub async fn create(&self, mut record: Map<String, Value>) -> Result<Value, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        record.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
        record.insert("created_at".to_string(), json!(now));
        record.insert("updated_at".to_string(), json!(now));
        let record = IsolationEnforcer::prepare_write(&self.scope, record);

        let created = match self.store.insert(&self.scope, self.resource, record, self.limit).await? {
            InsertOutcome::Created { record, .. } => record,
            InsertOutcome::LimitReached { current } => {
                return Err(TenancyError::LimitExceeded {
                    resource: self.resource,
                    current,
                    max: self.limit.unwrap_or(current),
                }
                .into())
            }
        };
        IsolationEnforcer::check_rows(&self.scope, std::slice::from_ref(&created))?;
        Ok(created)
    }

    /// Resets this kind's usage counter to the records actually stored
    pub async fn recount(&self) -> Result<u64, DatabaseError> {
        self.store.recount(&self.scope, self.resource).await
    }

    pub async fn delete_404(&self, id: &str) -> Result<Value, DatabaseError> {
        let mut filter = self.filter();
        filter.where_clause(json!({ "id": id }))?;

        let deleted = self.store.delete(&filter).await?;
        IsolationEnforcer::check_rows(&self.scope, &deleted)?;
        deleted
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::NotFound(format!("{} record '{}' not found", self.resource, id)))
    }

    fn relations(&self, populate: &[String]) -> Result<Vec<Relation>, DatabaseError> {
        populate
            .iter()
            .map(|field| {
                self.resource
                    .relation(field)
                    .ok_or_else(|| FilterError::InvalidPopulate(field.clone()).into())
            })
            .collect()
    }

    async fn populate(&self, mut rows: Vec<Value>, relations: &[Relation]) -> Result<Vec<Value>, DatabaseError> {
        if rows.is_empty() || relations.is_empty() {
            return Ok(rows);
        }

        let lookups = relations.iter().map(|relation| self.related(&rows, *relation));
        let related = try_join_all(lookups).await?;

        for (relation, by_id) in relations.iter().zip(related) {
            for row in rows.iter_mut() {
                let Some(field) = row.as_object_mut().and_then(|r| r.get_mut(relation.field)) else {
                    continue;
                };
                *field = match field.take() {
                    Value::String(id) => by_id.get(&id).cloned().unwrap_or(Value::Null),
                    // References to other tenants' records are dropped, not resolved
                    Value::Array(ids) => Value::Array(
                        ids.iter()
                            .filter_map(|id| id.as_str().and_then(|id| by_id.get(id)).cloned())
                            .collect(),
                    ),
                    other => other,
                };
            }
        }

        Ok(rows)
    }

    /// Fetches the referenced records for one relation inside this scope
    async fn related(&self, rows: &[Value], relation: Relation) -> Result<HashMap<String, Value>, DatabaseError> {
        let ids: BTreeSet<String> = rows
            .iter()
            .filter_map(|row| row.get(relation.field))
            .flat_map(|value| match value {
                Value::String(id) => vec![id.clone()],
                Value::Array(items) => items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect(),
                _ => vec![],
            })
            .collect();

        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut filter = Filter::new(&self.scope, relation.target);
        filter.where_clause(json!({ "id": { "$in": ids } }))?;

        let related = self.store.select(&filter).await?;
        IsolationEnforcer::check_rows(&self.scope, &related)?;

        Ok(related
            .into_iter()
            .filter_map(|row| {
                let id = row.get("id")?.as_str()?.to_string();
                Some((id, row))
            })
            .collect())
    }
}
