// handlers/root/tenant/update.rs - PATCH /api/root/tenant/:slug

use std::collections::{BTreeMap, BTreeSet};

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::{Deserialize, Deserializer};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, RootUser};
use crate::tenancy::{Branding, ResourceKind, TenantRecord, TenantStatus};

use super::super::audit;
use super::TenantPath;

/// Partial update; absent fields are left as they are.
/// `"domain": null` clears the custom domain.
#[derive(Debug, Default, Deserialize)]
pub struct TenantPatch {
    /// Accepted only so a changed slug is rejected instead of silently ignored
    pub slug: Option<String>,
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub domain: Option<Option<String>>,
    pub status: Option<TenantStatus>,
    pub features: Option<BTreeSet<String>>,
    pub limits: Option<BTreeMap<ResourceKind, i64>>,
    pub branding: Option<Branding>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TenantPatch {
    pub fn apply(self, record: &mut TenantRecord) {
        if let Some(slug) = self.slug {
            record.slug = slug;
        }
        if let Some(display_name) = self.display_name {
            record.display_name = display_name;
        }
        if let Some(domain) = self.domain {
            record.domain = domain;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(features) = self.features {
            record.features = features;
        }
        if let Some(limits) = self.limits {
            record.limits = limits;
        }
        if let Some(branding) = self.branding {
            record.branding = branding;
        }
    }
}

pub async fn update(
    State(state): State<AppState>,
    Extension(operator): Extension<RootUser>,
    Path(path): Path<TenantPath>,
    Json(patch): Json<TenantPatch>,
) -> ApiResult<TenantRecord> {
    let record = state
        .registry
        .update(&path.slug, |record| {
            patch.apply(record);
            Ok(())
        })
        .await?;
    audit(&state, &operator, "tenant.update", &record.slug);

    Ok(ApiResponse::success(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_domain_clears_and_absent_domain_keeps() {
        let mut record = TenantRecord::new("acme", "Acme").with_domain("acme.test");

        let keep: TenantPatch = serde_json::from_value(json!({ "display_name": "Acme Inc" })).unwrap();
        keep.apply(&mut record);
        assert_eq!(record.display_name, "Acme Inc");
        assert_eq!(record.domain.as_deref(), Some("acme.test"));

        let clear: TenantPatch = serde_json::from_value(json!({ "domain": null })).unwrap();
        clear.apply(&mut record);
        assert_eq!(record.domain, None);
    }
}
