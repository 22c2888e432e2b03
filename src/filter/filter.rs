use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_match::FilterMatch;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo, SqlResult};
use crate::tenancy::{ResourceKind, TenantScope, TENANT_COLUMN};

/// A tenant-scoped query over one resource kind.
///
/// Renders to SQL for Postgres or evaluates directly against in-memory rows;
/// both paths apply the scope's tenant before any caller condition.
#[derive(Debug, Clone)]
pub struct Filter {
    scope: TenantScope,
    resource: ResourceKind,
    select_columns: Vec<String>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i32>,
    offset: Option<i32>,
}

impl Filter {
    pub fn new(scope: &TenantScope, resource: ResourceKind) -> Self {
        Self {
            scope: scope.clone(),
            resource,
            select_columns: vec![],
            where_data: None,
            order_data: vec![],
            limit: None,
            offset: None,
        }
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        if let Some(select) = data.select { self.select(select)?; }
        if let Some(where_clause) = data.where_clause { self.where_clause(where_clause)?; }
        if let Some(order) = data.order { self.order(order)?; }
        match (data.limit, data.offset) {
            (Some(limit), offset) => { self.limit(limit, offset)?; }
            (None, Some(offset)) => { self.offset(offset)?; }
            (None, None) => {}
        }
        Ok(self)
    }

    pub fn select(&mut self, columns: Vec<String>) -> Result<&mut Self, FilterError> {
        for column in &columns {
            if column != "*" {
                validate_identifier(column)?;
            }
        }
        self.select_columns = columns;
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions).filter(|c| !c.is_null());
        Ok(self)
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(&order_spec)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i32, offset: Option<i32>) -> Result<&mut Self, FilterError> {
        if limit < 0 { return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string())); }

        // Apply max limit from config
        let max_limit = crate::config::CONFIG.filter.max_limit.unwrap_or(i32::MAX);
        let applied_limit = if limit > max_limit {
            if crate::config::CONFIG.filter.debug_logging {
                tracing::warn!("Limit {} exceeds max {}, capping to max", limit, max_limit);
            }
            max_limit
        } else {
            limit
        };

        self.limit = Some(applied_limit);
        if let Some(offset) = offset {
            self.offset(offset)?;
        }
        Ok(self)
    }

    pub fn offset(&mut self, offset: i32) -> Result<&mut Self, FilterError> {
        if offset < 0 { return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string())); }
        self.offset = Some(offset);
        Ok(self)
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;

        let query = [
            format!("SELECT {}", self.build_select_clause()),
            format!("FROM \"{}\"", self.resource.table_name()),
            format!("WHERE {}", where_result.query),
            FilterOrder::generate(&self.order_data),
            self.build_limit_clause(),
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult { query, params: where_result.params })
    }

    pub fn to_where_sql(&self) -> Result<SqlResult, FilterError> {
        let (query, params) = FilterWhere::generate(&self.scope, self.where_data.as_ref())?;
        Ok(SqlResult { query, params })
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let query = format!(
            "SELECT COUNT(*) as count FROM \"{}\" WHERE {}",
            self.resource.table_name(),
            where_result.query
        );
        Ok(SqlResult { query, params: where_result.params })
    }

    pub fn to_delete_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let query = format!(
            "DELETE FROM \"{}\" WHERE {} RETURNING *",
            self.resource.table_name(),
            where_result.query
        );
        Ok(SqlResult { query, params: where_result.params })
    }

    /// True when the row belongs to the scope and satisfies the conditions
    pub fn matches(&self, row: &Map<String, Value>) -> Result<bool, FilterError> {
        if !self.scope.owns(row) {
            return Ok(false);
        }
        match &self.where_data {
            Some(where_data) => FilterMatch::matches(where_data, row),
            None => Ok(true),
        }
    }

    /// In-memory equivalent of running `to_sql` against `rows`
    pub fn apply<'a, I>(&self, rows: I) -> Result<Vec<Map<String, Value>>, FilterError>
    where
        I: IntoIterator<Item = &'a Map<String, Value>>,
    {
        let mut matched = vec![];
        for row in rows {
            if self.matches(row)? {
                matched.push(row.clone());
            }
        }

        FilterMatch::sort(&mut matched, &self.order_data);

        let offset = self.offset.unwrap_or(0).max(0) as usize;
        let limit = self.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| self.project(row))
            .collect())
    }

    fn project(&self, row: Map<String, Value>) -> Map<String, Value> {
        let columns = self.projected_columns();
        if columns.is_empty() {
            return row;
        }
        row.into_iter().filter(|(k, _)| columns.contains(k)).collect()
    }

    /// Selected columns plus the id and owner needed for isolation checks
    fn projected_columns(&self) -> Vec<String> {
        if self.select_columns.is_empty() || self.select_columns.iter().any(|c| c == "*") {
            return vec![];
        }
        let mut columns = vec!["id".to_string(), TENANT_COLUMN.to_string()];
        for column in &self.select_columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        columns
    }

    fn build_select_clause(&self) -> String {
        let columns = self.projected_columns();
        if columns.is_empty() {
            "*".to_string()
        } else {
            columns.iter().map(|c| format!("\"{}\"", c)).collect::<Vec<_>>().join(", ")
        }
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}

/// Column names must be plain identifiers; they are quoted into SQL verbatim
pub(crate) fn validate_identifier(column: &str) -> Result<(), FilterError> {
    let mut chars = column.chars();
    let valid_start = chars.next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false);
    if !valid_start || column.len() > 63 || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", column)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::{TenantContext, TenantRecord, TENANT_COLUMN};
    use serde_json::json;

    fn scope() -> TenantScope {
        TenantScope::from_context(&TenantContext::administrative(&TenantRecord::new("acme", "Acme")))
    }

    fn row(scope: &TenantScope, id: &str, title: &str) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("id".to_string(), json!(id));
        row.insert(TENANT_COLUMN.to_string(), scope.tenant_value());
        row.insert("title".to_string(), json!(title));
        row
    }

    #[test]
    fn renders_scoped_select() {
        let scope = scope();
        let mut filter = Filter::new(&scope, ResourceKind::Jobs);
        filter
            .assign(FilterData {
                select: Some(vec!["title".to_string()]),
                where_clause: Some(json!({ "title": { "$ilike": "%rust%" } })),
                order: Some(json!("created_at desc")),
                limit: Some(10),
                offset: Some(20),
                populate: None,
            })
            .unwrap();

        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT \"id\", \"tenant_id\", \"title\" FROM \"jobs\" WHERE \"tenant_id\" = $1::uuid AND \"title\" ILIKE $2 ORDER BY \"created_at\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(sql.params[0], scope.tenant_value());
    }

    #[test]
    fn count_and_delete_keep_tenant_predicate() {
        let filter = Filter::new(&scope(), ResourceKind::Users);
        assert!(filter.to_count_sql().unwrap().query.contains(crate::tenancy::isolation::TENANT_PREDICATE));
        assert!(filter.to_delete_sql().unwrap().query.contains(crate::tenancy::isolation::TENANT_PREDICATE));
    }

    #[test]
    fn apply_ignores_other_tenants() {
        let scope = scope();
        let other = TenantScope::from_context(&TenantContext::administrative(&TenantRecord::new("globex", "Globex")));
        let rows = vec![row(&scope, "1", "b"), row(&other, "2", "a"), row(&scope, "3", "a")];

        let mut filter = Filter::new(&scope, ResourceKind::Jobs);
        filter.order(json!("title")).unwrap();
        let result = filter.apply(&rows).unwrap();

        let ids: Vec<&str> = result.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[test]
    fn rejects_negative_limit() {
        let mut filter = Filter::new(&scope(), ResourceKind::Jobs);
        assert!(filter.limit(-1, None).is_err());
        assert!(filter.limit(5, Some(-1)).is_err());
    }
}
