use serde_json::Value;

use super::error::FilterError;
use super::filter::validate_identifier;
use super::types::FilterOp;
use crate::tenancy::{TenantScope, TENANT_COLUMN};

/// Columns compared as timestamps when given string operands
const TIMESTAMP_COLUMNS: &[&str] = &["created_at", "updated_at", "starts_at"];

/// Builds parameterized WHERE clauses. The tenant predicate is always `$1`.
pub struct FilterWhere {
    param_values: Vec<Value>,
}

impl FilterWhere {
    pub fn generate(scope: &TenantScope, where_data: Option<&Value>) -> Result<(String, Vec<Value>), FilterError> {
        let mut builder = Self { param_values: vec![] };

        let tenant = builder.param(scope.tenant_value());
        let mut clauses = vec![format!("\"{}\" = {}::uuid", TENANT_COLUMN, tenant)];

        if let Some(data) = where_data.filter(|d| !d.is_null()) {
            Self::validate(data)?;
            clauses.extend(builder.build_object(data)?);
        }

        Ok((clauses.join(" AND "), builder.param_values))
    }

    /// Rejects raw SQL, unknown operators, bad identifiers and tenant_id references
    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null => Ok(()),
            Value::Object(_) => Self::validate_node(where_data, 0),
            Value::String(_) => Err(FilterError::InvalidWhereClause(
                "Raw SQL WHERE clauses are not accepted".to_string(),
            )),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn validate_node(node: &Value, depth: u32) -> Result<(), FilterError> {
        let max_depth = crate::config::CONFIG.filter.max_nested_depth;
        if depth > max_depth {
            return Err(FilterError::InvalidWhereClause(format!(
                "WHERE nesting exceeds maximum depth of {}",
                max_depth
            )));
        }

        let obj = node
            .as_object()
            .ok_or_else(|| FilterError::InvalidWhereClause("Expected an object".to_string()))?;

        for (key, value) in obj {
            match key.as_str() {
                "$and" | "$or" => {
                    let arr = value
                        .as_array()
                        .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", key)))?;
                    for item in arr {
                        Self::validate_node(item, depth + 1)?;
                    }
                }
                "$not" => Self::validate_node(value, depth + 1)?,
                op if op.starts_with('$') => return Err(FilterError::UnsupportedOperator(op.to_string())),
                field => {
                    validate_identifier(field)?;
                    if field == TENANT_COLUMN {
                        return Err(FilterError::ReservedColumn(field.to_string()));
                    }
                    if let Value::Object(ops) = value {
                        for op_key in ops.keys() {
                            if FilterOp::parse(op_key).is_none() {
                                return Err(FilterError::UnsupportedOperator(op_key.clone()));
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn build_object(&mut self, data: &Value) -> Result<Vec<String>, FilterError> {
        let obj = data
            .as_object()
            .ok_or_else(|| FilterError::InvalidWhereClause("Expected an object".to_string()))?;

        let mut parts = vec![];
        for (key, value) in obj {
            if key.starts_with('$') {
                parts.push(self.build_logical(key, value)?);
            } else {
                parts.extend(self.build_field(key, value)?);
            }
        }
        Ok(parts)
    }

    fn build_group(&mut self, data: &Value) -> Result<String, FilterError> {
        let parts = self.build_object(data)?;
        if parts.is_empty() {
            Ok("1=1".to_string())
        } else {
            Ok(format!("({})", parts.join(" AND ")))
        }
    }

    fn build_logical(&mut self, op: &str, value: &Value) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Ok(if op == "$and" { "1=1" } else { "1=0" }.to_string());
                }
                let groups = arr
                    .iter()
                    .map(|v| self.build_group(v))
                    .collect::<Result<Vec<_>, _>>()?;
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", groups.join(joiner)))
            }
            "$not" => Ok(format!("NOT {}", self.build_group(value)?)),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn build_field(&mut self, field: &str, value: &Value) -> Result<Vec<String>, FilterError> {
        match value {
            Value::Object(ops) => ops
                .iter()
                .map(|(op_key, data)| {
                    let op = FilterOp::parse(op_key)
                        .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    self.build_condition(field, op, data)
                })
                .collect(),
            // Implicit equality: { field: value }
            _ => Ok(vec![self.build_condition(field, FilterOp::Eq, value)?]),
        }
    }

    fn build_condition(&mut self, column: &str, op: FilterOp, data: &Value) -> Result<String, FilterError> {
        let quoted = format!("\"{}\"", column);
        Ok(match op {
            FilterOp::Eq if data.is_null() => format!("{} IS NULL", quoted),
            FilterOp::Ne if data.is_null() => format!("{} IS NOT NULL", quoted),
            FilterOp::Eq => format!("{} = {}", quoted, self.placeholder(column, data)),
            FilterOp::Ne => format!("{} <> {}", quoted, self.placeholder(column, data)),
            FilterOp::Gt => format!("{} > {}", quoted, self.placeholder(column, data)),
            FilterOp::Gte => format!("{} >= {}", quoted, self.placeholder(column, data)),
            FilterOp::Lt => format!("{} < {}", quoted, self.placeholder(column, data)),
            FilterOp::Lte => format!("{} <= {}", quoted, self.placeholder(column, data)),
            FilterOp::Like | FilterOp::ILike => {
                if !data.is_string() {
                    return Err(FilterError::InvalidOperatorData("Pattern must be a string".to_string()));
                }
                let keyword = if op == FilterOp::Like { "LIKE" } else { "ILIKE" };
                format!("{} {} {}", quoted, keyword, self.param(data.clone()))
            }
            FilterOp::In | FilterOp::NIn => {
                let values = Self::array(op, data)?;
                if values.is_empty() {
                    return Ok(if op == FilterOp::In { "1=0" } else { "1=1" }.to_string());
                }
                let params: Vec<String> = values.iter().map(|v| self.placeholder(column, v)).collect();
                let keyword = if op == FilterOp::In { "IN" } else { "NOT IN" };
                format!("{} {} ({})", quoted, keyword, params.join(", "))
            }
            FilterOp::Between => {
                let values = Self::array(op, data)?;
                if values.len() != 2 {
                    return Err(FilterError::InvalidOperatorData(
                        "$between requires exactly 2 values".to_string(),
                    ));
                }
                format!(
                    "{} BETWEEN {} AND {}",
                    quoted,
                    self.placeholder(column, &values[0]),
                    self.placeholder(column, &values[1])
                )
            }
            FilterOp::Any | FilterOp::All => {
                let values = Self::array(op, data)?;
                if values.is_empty() {
                    return Ok(if op == FilterOp::Any { "1=0" } else { "1=1" }.to_string());
                }
                let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                let keyword = if op == FilterOp::Any { "?|" } else { "?&" };
                format!("{} {} ARRAY[{}]::text[]", quoted, keyword, params.join(", "))
            }
            FilterOp::Size => {
                if !data.is_u64() {
                    return Err(FilterError::InvalidOperatorData(
                        "$size requires a non-negative integer".to_string(),
                    ));
                }
                format!("jsonb_array_length({}) = {}", quoted, self.param(data.clone()))
            }
        })
    }

    fn array(op: FilterOp, data: &Value) -> Result<&Vec<Value>, FilterError> {
        data.as_array().ok_or_else(|| {
            FilterError::InvalidOperatorData(format!("{:?} requires an array", op))
        })
    }

    fn placeholder(&mut self, column: &str, value: &Value) -> String {
        let param = self.param(value.clone());
        if value.is_string() && TIMESTAMP_COLUMNS.contains(&column) {
            format!("{}::timestamptz", param)
        } else {
            param
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        format!("${}", self.param_values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::{TenantContext, TenantRecord};
    use serde_json::json;

    fn scope() -> TenantScope {
        TenantScope::from_context(&TenantContext::administrative(&TenantRecord::new("acme", "Acme")))
    }

    #[test]
    fn tenant_predicate_comes_first() {
        let scope = scope();
        let (sql, params) = FilterWhere::generate(&scope, None).unwrap();
        assert_eq!(sql, "\"tenant_id\" = $1::uuid");
        assert_eq!(params, vec![scope.tenant_value()]);
    }

    #[test]
    fn operators_use_later_params() {
        let (sql, params) = FilterWhere::generate(
            &scope(),
            Some(&json!({ "status": "open", "salary": { "$gte": 1000 } })),
        )
        .unwrap();

        assert!(sql.starts_with("\"tenant_id\" = $1::uuid AND "));
        assert!(sql.contains("\"status\" = $2"));
        assert!(sql.contains("\"salary\" >= $3"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn logical_groups_share_one_param_sequence() {
        let (sql, params) = FilterWhere::generate(
            &scope(),
            Some(&json!({ "$or": [{ "name": "a" }, { "name": { "$in": ["b", "c"] } }] })),
        )
        .unwrap();

        assert!(sql.contains("((\"name\" = $2) OR (\"name\" IN ($3, $4)))"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn rejects_tenant_column_anywhere() {
        let err = FilterWhere::generate(
            &scope(),
            Some(&json!({ "$and": [{ "tenant_id": "x" }] })),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::ReservedColumn(_)));
    }

    #[test]
    fn rejects_raw_sql_and_bad_identifiers() {
        assert!(FilterWhere::validate(&json!("1=1 OR true")).is_err());
        assert!(FilterWhere::validate(&json!({ "name\" OR 1=1 --": "x" })).is_err());
        assert!(FilterWhere::validate(&json!({ "name": { "$regex": ".*" } })).is_err());
    }

    #[test]
    fn casts_timestamp_strings() {
        let (sql, _) = FilterWhere::generate(
            &scope(),
            Some(&json!({ "created_at": { "$gt": "2024-01-01T00:00:00Z" } })),
        )
        .unwrap();
        assert!(sql.contains("\"created_at\" > $2::timestamptz"));
    }
}
