use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::AppConfig;
use crate::database::{
    DatabaseManager, MemoryRecordStore, PgRecordStore, PgTenantStore, PgUsageStore, RecordStore,
    Repository,
};
use crate::handlers;
use crate::middleware::{
    require_feature, resolve_tenant_middleware, root_auth_middleware, FeatureGate,
};
use crate::tenancy::{
    LimitTracker, MemoryTenantStore, MemoryUsageStore, PolicyEvaluator, ResourceKind,
    TenancyError, TenantContext, TenantRecord, TenantRegistry, TenantResolver, TenantScope,
    TenantStore, UsageStore,
};

/// Shared services handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<TenantRegistry>,
    pub resolver: Arc<TenantResolver>,
    pub policy: Arc<PolicyEvaluator>,
    pub limits: Arc<LimitTracker>,
    pub records: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        tenants: Arc<dyn TenantStore>,
        usage: Arc<dyn UsageStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let registry = Arc::new(TenantRegistry::new(tenants, config.tenancy.cache_ttl()));
        let resolver = Arc::new(TenantResolver::new(registry.clone(), config.tenancy.clone()));
        let policy = Arc::new(PolicyEvaluator::new(registry.clone()));
        let limits = Arc::new(LimitTracker::new(registry.clone(), usage));

        Self {
            config: Arc::new(config),
            registry,
            resolver,
            policy,
            limits,
            records,
        }
    }

    /// Records and usage counters share one store so writes count themselves
    fn memory(config: AppConfig, tenants: MemoryTenantStore) -> Self {
        let usage = Arc::new(MemoryUsageStore::new());
        let records = Arc::new(MemoryRecordStore::new(usage.clone()));
        Self::new(config, Arc::new(tenants), usage, records)
    }

    /// Process-local state seeded with the given tenants
    pub fn in_memory(config: AppConfig, tenants: Vec<TenantRecord>) -> Result<Self, TenancyError> {
        let tenants = MemoryTenantStore::with_tenants(tenants)?;
        Ok(Self::memory(config, tenants))
    }

    /// Postgres-backed state when a database is configured, in-memory otherwise
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let seed = match &config.tenancy.tenants_file {
            Some(path) => Some(MemoryTenantStore::from_yaml_file(path)?),
            None => None,
        };

        if config.database.url.is_none() {
            info!("No DATABASE_URL configured, using in-memory stores");
            return Ok(Self::memory(config, seed.unwrap_or_default()));
        }

        let database = DatabaseManager::connect(&config.database).await?;
        database.ensure_schema().await?;
        let pool = database.pool().clone();

        let state = Self::new(
            config,
            Arc::new(PgTenantStore::new(pool.clone())),
            Arc::new(PgUsageStore::new(pool.clone())),
            Arc::new(PgRecordStore::new(pool)),
        );

        if let Some(seed) = seed {
            for record in seed.list().await? {
                if state.registry.find_by_slug(&record.slug).await?.is_some() {
                    continue;
                }
                info!("Seeding tenant {}", record.slug);
                state.registry.upsert(record).await?;
            }
        }

        Ok(state)
    }

    /// Repository bound to the request's tenant
    pub fn repository(&self, context: &TenantContext, resource: ResourceKind) -> Repository {
        Repository::new(self.records.clone(), resource, TenantScope::from_context(context))
    }
}

pub fn router(state: AppState) -> Router {
    let analytics = Router::new()
        .route("/api/analytics/summary", get(handlers::analytics::summary))
        .route_layer(from_fn_with_state(
            FeatureGate::new(state.policy.clone(), "analytics"),
            require_feature,
        ));

    let tenant_api = Router::new()
        .route("/api/tenant", get(handlers::tenant::profile))
        .route("/api/tenant/usage", get(handlers::tenant::usage))
        .route("/api/tenant/features/:feature", get(handlers::tenant::feature))
        .route(
            "/api/data/:resource",
            get(handlers::data::list).post(handlers::data::create),
        )
        .route(
            "/api/data/:resource/:id",
            get(handlers::data::show).delete(handlers::data::remove),
        )
        .route("/api/find/:resource", post(handlers::data::find))
        .merge(analytics)
        .route_layer(from_fn_with_state(state.clone(), resolve_tenant_middleware));

    let root_api = Router::new()
        .nest("/api/root/tenant", handlers::root::tenant::routes())
        .route("/api/root/cache/invalidate", post(handlers::root::cache::invalidate))
        .route_layer(from_fn_with_state(state.clone(), root_auth_middleware));

    let mut router = Router::new()
        .route("/", get(handlers::system::root))
        .route("/health", get(handlers::system::health))
        .merge(root_api)
        .merge(tenant_api.clone());

    if state.config.tenancy.path_resolution {
        router = router.nest("/:tenant", tenant_api);
    }

    let mut router = router.layer(CorsLayer::permissive());
    if state.config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}
