use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use super::error::TenancyError;
use super::model::{TenantId, TenantRecord};
use super::registry::validate_record;

/// Authoritative tenant persistence behind the registry cache
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn list(&self) -> Result<Vec<TenantRecord>, TenancyError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, TenancyError>;

    async fn upsert(&self, record: &TenantRecord) -> Result<(), TenancyError>;

    async fn health_check(&self) -> Result<(), TenancyError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TenantsFile {
    #[serde(default)]
    tenants: Vec<TenantRecord>,
}

/// Process-local tenant store, optionally seeded from YAML
#[derive(Debug, Default)]
pub struct MemoryTenantStore {
    tenants: RwLock<HashMap<TenantId, TenantRecord>>,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from records, applying the same checks as a registry upsert
    pub fn with_tenants(records: Vec<TenantRecord>) -> Result<Self, TenancyError> {
        let mut accepted: Vec<TenantRecord> = Vec::with_capacity(records.len());
        for record in records {
            validate_record(&record, &accepted)?;
            accepted.push(record);
        }

        let tenants = accepted.into_iter().map(|r| (r.id, r)).collect();
        Ok(Self {
            tenants: RwLock::new(tenants),
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, TenancyError> {
        let file: TenantsFile = serde_yaml::from_str(yaml)
            .map_err(|e| TenancyError::Validation(format!("Invalid tenants file: {}", e)))?;
        Self::with_tenants(file.tenants)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, TenancyError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            TenancyError::Store(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let store = Self::from_yaml_str(&yaml)?;
        info!("Loaded tenants from {}", path.display());
        Ok(store)
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn list(&self) -> Result<Vec<TenantRecord>, TenancyError> {
        let tenants = self.tenants.read().await;
        let mut records: Vec<TenantRecord> = tenants.values().cloned().collect();
        records.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(records)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, TenancyError> {
        let tenants = self.tenants.read().await;
        Ok(tenants.values().find(|r| r.slug == slug).cloned())
    }

    async fn upsert(&self, record: &TenantRecord) -> Result<(), TenancyError> {
        let mut tenants = self.tenants.write().await;
        tenants.insert(record.id, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::model::{ResourceKind, TenantStatus};

    const SEED: &str = r#"
tenants:
  - slug: acme
    display_name: Acme Corp
    domain: jobs.acme.com
    features: [job-posting, analytics]
    limits:
      jobs: 5
  - slug: globex
    display_name: Globex
    status: suspended
"#;

    #[tokio::test]
    async fn loads_yaml_seed() {
        let store = MemoryTenantStore::from_yaml_str(SEED).unwrap();
        let tenants = store.list().await.unwrap();

        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].slug, "acme");
        assert_eq!(tenants[0].limit_for(ResourceKind::Jobs), Some(5));
        assert_eq!(tenants[1].status, TenantStatus::Suspended);
    }

    #[test]
    fn rejects_duplicate_slugs_in_seed() {
        let yaml = r#"
tenants:
  - { slug: acme, display_name: One }
  - { slug: acme, display_name: Two }
"#;
        assert!(matches!(
            MemoryTenantStore::from_yaml_str(yaml),
            Err(TenancyError::Validation(_))
        ));
    }
}
