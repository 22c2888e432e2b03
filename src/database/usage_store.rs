use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row};
use tracing::error;

use crate::tenancy::limits::{Increment, UsageKey, UsageStore};
use crate::tenancy::TenancyError;

fn store_error(e: sqlx::Error) -> TenancyError {
    error!("Usage store query failed: {}", e);
    TenancyError::Store(e.to_string())
}

fn as_count(value: u64) -> i64 {
    value.min(i64::MAX as u64) as i64
}

// Statements below run on any connection, so record writes can count
// themselves inside their own transaction.

async fn ensure_row(conn: &mut PgConnection, key: UsageKey) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tenant_usage (tenant_id, resource_kind, current_count) VALUES ($1, $2, 0) \
         ON CONFLICT (tenant_id, resource_kind) DO NOTHING",
    )
    .bind(key.tenant_id.as_uuid())
    .bind(key.resource.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn current_in(conn: &mut PgConnection, key: UsageKey) -> Result<u64, sqlx::Error> {
    let count: Option<i64> = sqlx::query_scalar(
        "SELECT current_count FROM tenant_usage WHERE tenant_id = $1 AND resource_kind = $2",
    )
    .bind(key.tenant_id.as_uuid())
    .bind(key.resource.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(count.unwrap_or(0).max(0) as u64)
}

/// Conditional increment; the row lock it takes is held until the
/// surrounding transaction ends.
pub(crate) async fn increment_in(
    conn: &mut PgConnection,
    key: UsageKey,
    max: Option<u64>,
) -> Result<Increment, sqlx::Error> {
    ensure_row(conn, key).await?;

    let applied = sqlx::query(
        "UPDATE tenant_usage SET current_count = current_count + 1, updated_at = now() \
         WHERE tenant_id = $1 AND resource_kind = $2 AND ($3::bigint IS NULL OR current_count < $3) \
         RETURNING current_count",
    )
    .bind(key.tenant_id.as_uuid())
    .bind(key.resource.as_str())
    .bind(max.map(as_count))
    .fetch_optional(&mut *conn)
    .await?;

    match applied {
        Some(row) => {
            let count: i64 = row.try_get("current_count")?;
            Ok(Increment::Applied(count.max(0) as u64))
        }
        None => Ok(Increment::Denied(current_in(conn, key).await?)),
    }
}

pub(crate) async fn decrement_in(conn: &mut PgConnection, key: UsageKey, by: u64) -> Result<u64, sqlx::Error> {
    let count: Option<i64> = sqlx::query_scalar(
        "UPDATE tenant_usage SET current_count = GREATEST(current_count - $3, 0), updated_at = now() \
         WHERE tenant_id = $1 AND resource_kind = $2 RETURNING current_count",
    )
    .bind(key.tenant_id.as_uuid())
    .bind(key.resource.as_str())
    .bind(as_count(by))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(count.unwrap_or(0).max(0) as u64)
}

/// Locks the counter row for the rest of the transaction and returns its value
pub(crate) async fn lock_in(conn: &mut PgConnection, key: UsageKey) -> Result<u64, sqlx::Error> {
    ensure_row(conn, key).await?;

    let count: i64 = sqlx::query_scalar(
        "SELECT current_count FROM tenant_usage WHERE tenant_id = $1 AND resource_kind = $2 FOR UPDATE",
    )
    .bind(key.tenant_id.as_uuid())
    .bind(key.resource.as_str())
    .fetch_one(&mut *conn)
    .await?;
    Ok(count.max(0) as u64)
}

pub(crate) async fn set_in(conn: &mut PgConnection, key: UsageKey, count: u64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE tenant_usage SET current_count = $3, updated_at = now() \
         WHERE tenant_id = $1 AND resource_kind = $2",
    )
    .bind(key.tenant_id.as_uuid())
    .bind(key.resource.as_str())
    .bind(as_count(count))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Postgres usage counters. The ceiling is enforced inside a single
/// conditional UPDATE, so the row lock serializes racing reservations.
pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn try_increment(&self, key: UsageKey, max: Option<u64>) -> Result<Increment, TenancyError> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;
        increment_in(&mut conn, key, max).await.map_err(store_error)
    }

    async fn decrement(&self, key: UsageKey) -> Result<u64, TenancyError> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;
        decrement_in(&mut conn, key, 1).await.map_err(store_error)
    }

    async fn current(&self, key: UsageKey) -> Result<u64, TenancyError> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;
        current_in(&mut conn, key).await.map_err(store_error)
    }
}
