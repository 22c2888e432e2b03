use serde_json::Value;
use sqlx::{self, postgres::PgArguments, Executor, Postgres, Row};

use crate::database::manager::DatabaseError;
use crate::filter::types::SqlResult;
use crate::filter::Filter;
use crate::tenancy::IsolationEnforcer;

/// Runs a [`Filter`] against Postgres, returning rows as JSON objects.
///
/// Every statement is checked by the isolation enforcer before it is sent.
/// Methods take any executor: the pool, or a transaction's connection.
pub struct QueryBuilder<'f> {
    filter: &'f Filter,
}

impl<'f> QueryBuilder<'f> {
    pub fn new(filter: &'f Filter) -> Self {
        Self { filter }
    }

    pub async fn select_all<'c, E>(&self, executor: E) -> Result<Vec<Value>, DatabaseError>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let sql_result = self.checked(self.filter.to_sql()?)?;
        let query = format!("SELECT row_to_json(t) AS row FROM ({}) t", sql_result.query);
        self.fetch_rows(executor, &query, &sql_result.params).await
    }

    pub async fn count<'c, E>(&self, executor: E) -> Result<i64, DatabaseError>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let sql_result = self.checked(self.filter.to_count_sql()?)?;

        let mut q = sqlx::query(&sql_result.query);
        for p in sql_result.params.iter() {
            q = bind_param_query(q, p);
        }
        let row = q.fetch_one(executor).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count)
    }

    pub async fn delete_all<'c, E>(&self, executor: E) -> Result<Vec<Value>, DatabaseError>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let sql_result = self.checked(self.filter.to_delete_sql()?)?;
        let query = format!(
            "WITH deleted AS ({}) SELECT row_to_json(deleted) AS row FROM deleted",
            sql_result.query
        );
        self.fetch_rows(executor, &query, &sql_result.params).await
    }

    fn checked(&self, sql_result: SqlResult) -> Result<SqlResult, DatabaseError> {
        IsolationEnforcer::check_query(self.filter.scope(), &sql_result)?;
        if crate::config::CONFIG.filter.debug_logging {
            tracing::debug!("SQL: {} ({} params)", sql_result.query, sql_result.params.len());
        }
        Ok(sql_result)
    }

    async fn fetch_rows<'c, E>(&self, executor: E, query: &str, params: &[Value]) -> Result<Vec<Value>, DatabaseError>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let mut q = sqlx::query(query);
        for p in params.iter() {
            q = bind_param_query(q, p);
        }
        let rows = q.fetch_all(executor).await?;
        rows.iter()
            .map(|row| row.try_get::<Value, _>("row").map_err(DatabaseError::from))
            .collect()
    }
}

pub(crate) fn bind_param_query<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(u) = n.as_u64() {
                // Postgres doesn't have u64; cast down if safe
                q.bind(u as i64)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        // Whole arrays and objects compare as JSONB
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()),
    }
}
