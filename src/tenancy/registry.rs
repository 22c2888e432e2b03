use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::TenancyError;
use super::model::{validate_slug, TenantId, TenantRecord};
use super::store::TenantStore;

/// Immutable view of every tenant, swapped wholesale on refresh
#[derive(Debug, Clone, Default)]
struct Snapshot {
    loaded_at: Option<Instant>,
    generation: u64,
    by_id: HashMap<TenantId, Arc<TenantRecord>>,
    by_slug: HashMap<String, TenantId>,
    by_domain: HashMap<String, TenantId>,
}

impl Snapshot {
    fn build(records: Vec<TenantRecord>, generation: u64) -> Self {
        let mut snapshot = Snapshot {
            loaded_at: Some(Instant::now()),
            generation,
            ..Snapshot::default()
        };

        for record in records {
            snapshot.by_slug.insert(record.slug.clone(), record.id);
            if let Some(domain) = &record.domain {
                snapshot.by_domain.insert(domain.to_ascii_lowercase(), record.id);
            }
            snapshot.by_id.insert(record.id, Arc::new(record));
        }

        snapshot
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.map(|at| at.elapsed() < ttl).unwrap_or(false)
    }

    fn by_key(&self, id: Option<&TenantId>) -> Option<Arc<TenantRecord>> {
        id.and_then(|id| self.by_id.get(id)).cloned()
    }
}

/// Read-mostly tenant lookup backed by a [`TenantStore`].
///
/// Reads are served from a lock-free snapshot. When the snapshot is older than
/// the TTL (or was invalidated) the next reader reloads it; concurrent readers
/// wait on the same reload instead of issuing their own.
///
/// Writes are serialized and bump a write epoch. A reload that overlapped a
/// write is served once but never marked fresh.
pub struct TenantRegistry {
    store: Arc<dyn TenantStore>,
    ttl: Duration,
    snapshot: ArcSwap<Snapshot>,
    refresh: Mutex<()>,
    writes: Mutex<()>,
    epoch: AtomicU64,
}

impl TenantRegistry {
    pub fn new(store: Arc<dyn TenantStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            refresh: Mutex::new(()),
            writes: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    async fn snapshot(&self) -> Result<Arc<Snapshot>, TenancyError> {
        let current = self.snapshot.load_full();
        if current.is_fresh(self.ttl) {
            return Ok(current);
        }

        let _guard = self.refresh.lock().await;

        // Another reader may have refreshed while we waited
        let current = self.snapshot.load_full();
        if current.is_fresh(self.ttl) {
            return Ok(current);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        match self.store.list().await {
            Ok(records) => {
                let fresh = Arc::new(Snapshot::build(records, current.generation + 1));
                debug!(
                    "Tenant registry refreshed: {} tenants (generation {})",
                    fresh.by_id.len(),
                    fresh.generation
                );
                self.snapshot.store(fresh.clone());

                // Checked after the store: a write that bumped the epoch first
                // gets expired here, one that bumps it later expires on its own
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    debug!("Tenant write overlapped refresh; expiring generation {}", fresh.generation);
                    self.expire();
                }
                Ok(fresh)
            }
            Err(e) if current.generation > 0 => {
                warn!("Tenant store refresh failed, serving stale registry: {}", e);
                Ok(current)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_by_id(&self, id: &TenantId) -> Result<Option<Arc<TenantRecord>>, TenancyError> {
        Ok(self.snapshot().await?.by_key(Some(id)))
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Arc<TenantRecord>>, TenancyError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.by_key(snapshot.by_slug.get(&slug.to_ascii_lowercase())))
    }

    pub async fn find_by_domain(&self, host: &str) -> Result<Option<Arc<TenantRecord>>, TenancyError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.by_key(snapshot.by_domain.get(&host.to_ascii_lowercase())))
    }

    pub async fn get_by_id(&self, id: &TenantId) -> Result<Arc<TenantRecord>, TenancyError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| TenancyError::NotFound(format!("Tenant '{}' not found", id)))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Arc<TenantRecord>, TenancyError> {
        self.find_by_slug(slug)
            .await?
            .ok_or_else(|| TenancyError::NotFound(format!("Tenant '{}' not found", slug)))
    }

    pub async fn get_by_domain(&self, host: &str) -> Result<Arc<TenantRecord>, TenancyError> {
        self.find_by_domain(host)
            .await?
            .ok_or_else(|| TenancyError::NotFound(format!("No tenant for domain '{}'", host)))
    }

    /// Reads straight from the store, bypassing the cache. Used by write paths.
    pub async fn load_by_slug(&self, slug: &str) -> Result<TenantRecord, TenancyError> {
        self.store
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| TenancyError::NotFound(format!("Tenant '{}' not found", slug)))
    }

    pub async fn list_all(&self) -> Result<Vec<Arc<TenantRecord>>, TenancyError> {
        let snapshot = self.snapshot().await?;
        let mut records: Vec<Arc<TenantRecord>> = snapshot.by_id.values().cloned().collect();
        records.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(records)
    }

    pub async fn list_active(&self) -> Result<Vec<Arc<TenantRecord>>, TenancyError> {
        let mut records = self.list_all().await?;
        records.retain(|r| r.is_active());
        Ok(records)
    }

    /// Validates and persists a tenant, then drops the cached snapshot
    pub async fn upsert(&self, record: TenantRecord) -> Result<TenantRecord, TenancyError> {
        let _guard = self.writes.lock().await;
        self.write(record).await
    }

    /// Persists a new tenant; fails with `Conflict` if the slug is taken
    pub async fn create(&self, record: TenantRecord) -> Result<TenantRecord, TenancyError> {
        let _guard = self.writes.lock().await;
        if self.store.get_by_slug(&record.slug).await?.is_some() {
            return Err(TenancyError::Conflict(format!("Tenant '{}' already exists", record.slug)));
        }
        self.write(record).await
    }

    /// Read-modify-write of one tenant, serialized with every other write
    pub async fn update<F>(&self, slug: &str, change: F) -> Result<TenantRecord, TenancyError>
    where
        F: FnOnce(&mut TenantRecord) -> Result<(), TenancyError>,
    {
        let _guard = self.writes.lock().await;
        let mut record = self.load_by_slug(slug).await?;
        change(&mut record)?;
        self.write(record).await
    }

    /// Callers hold `writes`
    async fn write(&self, mut record: TenantRecord) -> Result<TenantRecord, TenancyError> {
        record.domain = record
            .domain
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty());

        let existing = self.store.list().await?;
        validate_record(&record, &existing)?;

        let now = Utc::now();
        match existing.iter().find(|r| r.id == record.id) {
            Some(previous) => record.created_at = previous.created_at,
            None => record.created_at = now,
        }
        record.updated_at = now;

        self.store.upsert(&record).await?;
        self.invalidate();

        info!("Upserted tenant {} ({}) status={}", record.slug, record.id, record.status);
        Ok(record)
    }

    /// Forces the next read to reload from the store
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.expire();
        debug!("Tenant registry invalidated");
    }

    fn expire(&self) {
        let current = self.snapshot.load_full();
        self.snapshot.store(Arc::new(Snapshot {
            loaded_at: None,
            ..(*current).clone()
        }));
    }

    pub async fn health_check(&self) -> Result<(), TenancyError> {
        self.store.health_check().await
    }
}

/// Checks a record against the slug, limit and uniqueness rules
pub(crate) fn validate_record(
    record: &TenantRecord,
    existing: &[TenantRecord],
) -> Result<(), TenancyError> {
    validate_slug(&record.slug).map_err(TenancyError::Validation)?;

    if record.display_name.trim().is_empty() {
        return Err(TenancyError::Validation("Display name is required".to_string()));
    }

    if let Some(domain) = &record.domain {
        if domain.is_empty()
            || domain.contains('/')
            || domain.contains(':')
            || domain.contains(char::is_whitespace)
        {
            return Err(TenancyError::Validation(format!("Invalid domain '{}'", domain)));
        }
    }

    for (resource, max) in &record.limits {
        if *max < 0 {
            return Err(TenancyError::Validation(format!(
                "Limit for {} must be non-negative, got {}",
                resource, max
            )));
        }
    }

    for other in existing {
        if other.id == record.id {
            if other.slug != record.slug {
                return Err(TenancyError::Validation(format!(
                    "Tenant slug '{}' cannot be changed",
                    other.slug
                )));
            }
            continue;
        }

        if other.slug == record.slug {
            return Err(TenancyError::Validation(format!(
                "Tenant slug '{}' is already taken",
                record.slug
            )));
        }

        if let (Some(mine), Some(theirs)) = (&record.domain, &other.domain) {
            if mine.eq_ignore_ascii_case(theirs) {
                return Err(TenancyError::Validation(format!(
                    "Domain '{}' is already assigned to another tenant",
                    mine
                )));
            }
        }
    }

    Ok(())
}
