use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::error::TenancyError;
use super::model::{ResourceKind, TenantId};
use super::registry::TenantRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub tenant_id: TenantId,
    pub resource: ResourceKind,
}

impl UsageKey {
    pub fn new(tenant_id: TenantId, resource: ResourceKind) -> Self {
        Self { tenant_id, resource }
    }
}

/// Outcome of an increment attempted against a ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Increment {
    /// Counter was bumped; holds the new value
    Applied(u64),
    /// Counter was already at the ceiling; holds the unchanged value
    Denied(u64),
}

/// Durable per-tenant usage counters.
///
/// `try_increment` must be atomic: two callers racing for the last slot under
/// a ceiling cannot both succeed. Record stores that count their own writes
/// share these counters.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn try_increment(&self, key: UsageKey, max: Option<u64>) -> Result<Increment, TenancyError>;

    /// Decrements without going below zero and returns the new value
    async fn decrement(&self, key: UsageKey) -> Result<u64, TenancyError>;

    async fn current(&self, key: UsageKey) -> Result<u64, TenancyError>;
}

/// Bumps `counter` unless it already sits at `max`
pub(crate) fn increment_with_ceiling(counter: &AtomicU64, max: Option<u64>) -> Increment {
    let result = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match max {
        Some(max) if current >= max => None,
        _ => Some(current + 1),
    });
    match result {
        Ok(previous) => Increment::Applied(previous + 1),
        Err(current) => Increment::Denied(current),
    }
}

/// Subtracts `n`, saturating at zero, and returns the new value
pub(crate) fn decrement_by(counter: &AtomicU64, n: u64) -> u64 {
    let result = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_sub(n))
    });
    match result {
        Ok(previous) | Err(previous) => previous.saturating_sub(n),
    }
}

#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    counters: RwLock<HashMap<UsageKey, Arc<AtomicU64>>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn counter(&self, key: UsageKey) -> Arc<AtomicU64> {
        if let Some(counter) = self.counters.read().await.get(&key) {
            return counter.clone();
        }
        self.counters.write().await.entry(key).or_default().clone()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn try_increment(&self, key: UsageKey, max: Option<u64>) -> Result<Increment, TenancyError> {
        Ok(increment_with_ceiling(&*self.counter(key).await, max))
    }

    async fn decrement(&self, key: UsageKey) -> Result<u64, TenancyError> {
        Ok(decrement_by(&*self.counter(key).await, 1))
    }

    async fn current(&self, key: UsageKey) -> Result<u64, TenancyError> {
        Ok(self
            .counters
            .read()
            .await
            .get(&key)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0))
    }
}

/// Result of a limit check. `max` is `None` for unlimited resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitCheck {
    pub allowed: bool,
    pub current: u64,
    pub max: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub resource: ResourceKind,
    pub current: u64,
    pub max: Option<u64>,
}

/// Enforces per-tenant quotas over a [`UsageStore`].
///
/// Record creation does not go through `check_and_reserve`: the record store
/// counts the insert against [`LimitTracker::ceiling`] in the same unit of
/// work, so a create and its increment land together or not at all.
pub struct LimitTracker {
    registry: Arc<TenantRegistry>,
    store: Arc<dyn UsageStore>,
}

impl LimitTracker {
    pub fn new(registry: Arc<TenantRegistry>, store: Arc<dyn UsageStore>) -> Self {
        Self { registry, store }
    }

    /// The tenant's configured maximum for a resource kind, `None` if unlimited
    pub async fn ceiling(&self, tenant_id: &TenantId, resource: ResourceKind) -> Result<Option<u64>, TenancyError> {
        Ok(self.registry.get_by_id(tenant_id).await?.limit_for(resource))
    }

    /// Atomically checks the ceiling and counts one slot when under it
    pub async fn check_and_reserve(
        &self,
        tenant_id: &TenantId,
        resource: ResourceKind,
    ) -> Result<LimitCheck, TenancyError> {
        let max = self.ceiling(tenant_id, resource).await?;
        let key = UsageKey::new(*tenant_id, resource);

        match self.store.try_increment(key, max).await? {
            Increment::Applied(current) => {
                debug!("Reserved {} for tenant {}: {}/{:?}", resource, tenant_id, current, max);
                Ok(LimitCheck {
                    allowed: true,
                    current,
                    max,
                })
            }
            Increment::Denied(current) => {
                info!(
                    "Limit reached for tenant {} on {}: {}/{}",
                    tenant_id,
                    resource,
                    current,
                    max.unwrap_or(current)
                );
                Ok(LimitCheck {
                    allowed: false,
                    current,
                    max,
                })
            }
        }
    }

    /// Gives back one slot
    pub async fn release(&self, tenant_id: &TenantId, resource: ResourceKind) -> Result<u64, TenancyError> {
        let current = self.store.decrement(UsageKey::new(*tenant_id, resource)).await?;
        debug!("Released {} for tenant {}: now {}", resource, tenant_id, current);
        Ok(current)
    }

    pub async fn usage(&self, tenant_id: &TenantId) -> Result<Vec<UsageSnapshot>, TenancyError> {
        let record = self.registry.get_by_id(tenant_id).await?;
        let mut snapshots = Vec::with_capacity(ResourceKind::ALL.len());
        for resource in ResourceKind::ALL {
            snapshots.push(UsageSnapshot {
                resource,
                current: self.store.current(UsageKey::new(*tenant_id, resource)).await?,
                max: record.limit_for(resource),
            });
        }
        Ok(snapshots)
    }
}
