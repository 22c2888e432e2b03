use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::error;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::tenancy::{Branding, ResourceKind, TenancyError, TenantRecord, TenantStatus, TenantStore};

#[derive(Debug, FromRow)]
struct TenantRow {
    id: Uuid,
    slug: String,
    display_name: String,
    domain: Option<String>,
    status: String,
    features: Json<BTreeSet<String>>,
    limits: Json<BTreeMap<ResourceKind, i64>>,
    branding: Json<Branding>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for TenantRecord {
    type Error = TenancyError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let status: TenantStatus = row.status.parse().map_err(TenancyError::Store)?;
        Ok(TenantRecord {
            id: row.id.into(),
            slug: row.slug,
            display_name: row.display_name,
            domain: row.domain,
            status,
            features: row.features.0,
            limits: row.limits.0,
            branding: row.branding.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_TENANTS: &str = "SELECT id, slug, display_name, domain, status, features, limits, branding, created_at, updated_at FROM tenants";

fn store_error(e: sqlx::Error) -> TenancyError {
    error!("Tenant store query failed: {}", e);
    TenancyError::from(DatabaseError::from(e))
}

/// Postgres-backed tenant records
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn list(&self) -> Result<Vec<TenantRecord>, TenancyError> {
        let query = format!("{} ORDER BY slug", SELECT_TENANTS);
        let rows = sqlx::query_as::<_, TenantRow>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.into_iter().map(TenantRecord::try_from).collect()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, TenancyError> {
        let query = format!("{} WHERE slug = $1", SELECT_TENANTS);
        let row = sqlx::query_as::<_, TenantRow>(&query)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(TenantRecord::try_from).transpose()
    }

    async fn upsert(&self, record: &TenantRecord) -> Result<(), TenancyError> {
        // Slug is deliberately absent from the update set
        sqlx::query(
            r#"INSERT INTO tenants (id, slug, display_name, domain, status, features, limits, branding, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               ON CONFLICT (id) DO UPDATE SET
                   display_name = EXCLUDED.display_name,
                   domain = EXCLUDED.domain,
                   status = EXCLUDED.status,
                   features = EXCLUDED.features,
                   limits = EXCLUDED.limits,
                   branding = EXCLUDED.branding,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.slug)
        .bind(&record.display_name)
        .bind(&record.domain)
        .bind(record.status.as_str())
        .bind(Json(&record.features))
        .bind(Json(&record.limits))
        .bind(Json(&record.branding))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            TenancyError::from(DatabaseError::from_write(e, || {
                format!("Tenant slug '{}' or its domain is already in use", record.slug)
            }))
        })?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), TenancyError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
