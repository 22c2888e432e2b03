use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Slugs that collide with routing prefixes or well-known hostnames
pub const RESERVED_SLUGS: &[&str] = &["api", "www", "health", "admin", "root"];

/// Opaque, stable tenant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Pending,
    Inactive,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Pending => "pending",
            TenantStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "pending" => Ok(TenantStatus::Pending),
            "inactive" => Ok(TenantStatus::Inactive),
            other => Err(format!("unknown tenant status '{}'", other)),
        }
    }
}

/// Tenant-owned resource kinds. Each maps onto a table of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Users,
    Activities,
    Polls,
    Jobs,
    Groups,
    Presentations,
    TrainingCourses,
    TrainingSessions,
    TrainingModules,
    Assessments,
}

/// A populate-able reference from one resource kind to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub field: &'static str,
    pub target: ResourceKind,
    /// The field holds an array of ids rather than a single id
    pub many: bool,
}

const fn one(field: &'static str, target: ResourceKind) -> Relation {
    Relation { field, target, many: false }
}

const fn many(field: &'static str, target: ResourceKind) -> Relation {
    Relation { field, target, many: true }
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Users,
        ResourceKind::Activities,
        ResourceKind::Polls,
        ResourceKind::Jobs,
        ResourceKind::Groups,
        ResourceKind::Presentations,
        ResourceKind::TrainingCourses,
        ResourceKind::TrainingSessions,
        ResourceKind::TrainingModules,
        ResourceKind::Assessments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Users => "users",
            ResourceKind::Activities => "activities",
            ResourceKind::Polls => "polls",
            ResourceKind::Jobs => "jobs",
            ResourceKind::Groups => "groups",
            ResourceKind::Presentations => "presentations",
            ResourceKind::TrainingCourses => "training_courses",
            ResourceKind::TrainingSessions => "training_sessions",
            ResourceKind::TrainingModules => "training_modules",
            ResourceKind::Assessments => "assessments",
        }
    }

    pub fn table_name(&self) -> &'static str {
        self.as_str()
    }

    /// Capability a tenant must have enabled to touch this kind
    pub fn required_feature(&self) -> Option<&'static str> {
        match self {
            ResourceKind::Users => None,
            ResourceKind::Activities => Some("activities"),
            ResourceKind::Polls => Some("polls"),
            ResourceKind::Jobs => Some("job-posting"),
            ResourceKind::Groups => Some("groups"),
            ResourceKind::Presentations => Some("presentations"),
            ResourceKind::TrainingCourses
            | ResourceKind::TrainingSessions
            | ResourceKind::TrainingModules
            | ResourceKind::Assessments => Some("training"),
        }
    }

    /// Fields that are unique within a tenant (never globally)
    pub fn unique_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Users => &["email"],
            _ => &[],
        }
    }

    pub fn relations(&self) -> &'static [Relation] {
        const ACTIVITIES: &[Relation] = &[one("actor_id", ResourceKind::Users)];
        const POLLS: &[Relation] = &[
            one("created_by", ResourceKind::Users),
            one("group_id", ResourceKind::Groups),
        ];
        const JOBS: &[Relation] = &[one("posted_by", ResourceKind::Users)];
        const GROUPS: &[Relation] = &[
            one("owner_id", ResourceKind::Users),
            many("members", ResourceKind::Users),
        ];
        const PRESENTATIONS: &[Relation] = &[one("owner_id", ResourceKind::Users)];
        const COURSES: &[Relation] = &[one("instructor_id", ResourceKind::Users)];
        const SESSIONS: &[Relation] = &[one("course_id", ResourceKind::TrainingCourses)];
        const MODULES: &[Relation] = &[one("course_id", ResourceKind::TrainingCourses)];
        const ASSESSMENTS: &[Relation] = &[one("module_id", ResourceKind::TrainingModules)];

        match self {
            ResourceKind::Users => &[],
            ResourceKind::Activities => ACTIVITIES,
            ResourceKind::Polls => POLLS,
            ResourceKind::Jobs => JOBS,
            ResourceKind::Groups => GROUPS,
            ResourceKind::Presentations => PRESENTATIONS,
            ResourceKind::TrainingCourses => COURSES,
            ResourceKind::TrainingSessions => SESSIONS,
            ResourceKind::TrainingModules => MODULES,
            ResourceKind::Assessments => ASSESSMENTS,
        }
    }

    pub fn relation(&self, field: &str) -> Option<Relation> {
        self.relations().iter().copied().find(|r| r.field == field)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown resource '{}'", s))
    }
}

/// Display-only tenant metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    #[serde(default = "TenantId::generate")]
    pub id: TenantId,
    pub slug: String,
    pub display_name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_status")]
    pub status: TenantStatus,
    #[serde(default)]
    pub features: BTreeSet<String>,
    /// Maximum record count per resource kind; an absent kind is unlimited
    #[serde(default)]
    pub limits: BTreeMap<ResourceKind, i64>,
    #[serde(default)]
    pub branding: Branding,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_status() -> TenantStatus {
    TenantStatus::Active
}

impl TenantRecord {
    pub fn new(slug: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TenantId::generate(),
            slug: slug.into(),
            display_name: display_name.into(),
            domain: None,
            status: TenantStatus::Active,
            features: BTreeSet::new(),
            limits: BTreeMap::new(),
            branding: Branding::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    pub fn with_limit(mut self, resource: ResourceKind, max: i64) -> Self {
        self.limits.insert(resource, max);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    pub fn limit_for(&self, resource: ResourceKind) -> Option<u64> {
        self.limits.get(&resource).map(|max| (*max).max(0) as u64)
    }
}

/// Where the tenant of a request was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedFrom {
    Header,
    Subdomain,
    CustomDomain,
    PathParam,
    Default,
    Administrative,
}

impl fmt::Display for ResolvedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolvedFrom::Header => "header",
            ResolvedFrom::Subdomain => "subdomain",
            ResolvedFrom::CustomDomain => "custom domain",
            ResolvedFrom::PathParam => "path",
            ResolvedFrom::Default => "default tenant",
            ResolvedFrom::Administrative => "administrative",
        };
        f.write_str(label)
    }
}

/// Per-request tenant identity. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    tenant_id: TenantId,
    slug: String,
    resolved_from: ResolvedFrom,
    requested_capability: Option<String>,
}

impl TenantContext {
    pub(crate) fn resolved(record: &TenantRecord, resolved_from: ResolvedFrom) -> Self {
        Self {
            tenant_id: record.id,
            slug: record.slug.clone(),
            resolved_from,
            requested_capability: None,
        }
    }

    /// Context for operator actions that name their target tenant explicitly
    pub fn administrative(record: &TenantRecord) -> Self {
        Self::resolved(record, ResolvedFrom::Administrative)
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.requested_capability = Some(capability.into());
        self
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn resolved_from(&self) -> ResolvedFrom {
        self.resolved_from
    }

    pub fn requested_capability(&self) -> Option<&str> {
        self.requested_capability.as_deref()
    }
}

/// Checks the slug format: lowercase letters, digits and inner hyphens, 2-63 chars
pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.len() < 2 || slug.len() > 63 {
        return Err("Tenant slug must be between 2 and 63 characters".to_string());
    }

    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(
            "Tenant slug can only contain lowercase letters, numbers, and hyphens".to_string(),
        );
    }

    if slug.starts_with('-') || slug.ends_with('-') {
        return Err("Tenant slug cannot start or end with a hyphen".to_string());
    }

    if RESERVED_SLUGS.contains(&slug) {
        return Err(format!("Tenant slug '{}' is reserved", slug));
    }

    Ok(())
}
