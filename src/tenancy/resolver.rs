use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::TenancyError;
use super::isolation::SECURITY_TARGET;
use super::model::{ResolvedFrom, TenantContext, TenantId, TenantRecord, RESERVED_SLUGS};
use super::registry::TenantRegistry;
use crate::config::TenancyConfig;

/// The parts of an inbound request that can identify a tenant
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionRequest<'a> {
    pub host: Option<&'a str>,
    pub tenant_header: Option<&'a str>,
    pub path: &'a str,
}

/// Maps a request onto exactly one tenant.
///
/// Precedence is header, then host (custom domain before subdomain), then the
/// first path segment, then the configured default. The first source that
/// names a tenant wins; a source that names an unknown tenant fails the request
/// and never reaches the default.
pub struct TenantResolver {
    registry: Arc<TenantRegistry>,
    config: TenancyConfig,
}

type Candidate = (Arc<TenantRecord>, ResolvedFrom);

impl TenantResolver {
    pub fn new(registry: Arc<TenantRegistry>, config: TenancyConfig) -> Self {
        Self { registry, config }
    }

    pub fn header_name(&self) -> &str {
        &self.config.tenant_header
    }

    pub async fn resolve(&self, request: &ResolutionRequest<'_>) -> Result<TenantContext, TenancyError> {
        let (record, resolved_from) = self.select(request).await?;

        if !record.is_active() {
            warn!(
                "Rejected request for tenant {} ({}) resolved from {}",
                record.slug, record.status, resolved_from
            );
            return Err(TenancyError::TenantInactive {
                slug: record.slug.clone(),
                status: record.status,
            });
        }

        debug!("Resolved tenant {} from {}", record.slug, resolved_from);
        Ok(TenantContext::resolved(&record, resolved_from))
    }

    async fn select(&self, request: &ResolutionRequest<'_>) -> Result<Candidate, TenancyError> {
        if let Some(value) = self.header_value(request) {
            let record = self
                .lookup_header(value)
                .await?
                .ok_or_else(|| TenancyError::unknown_tenant(ResolvedFrom::Header, value))?;
            self.audit_disagreement(&record, request).await?;
            return Ok((record, ResolvedFrom::Header));
        }

        if let Some(found) = self.from_host(request.host).await? {
            return Ok(found);
        }

        if let Some(record) = self.from_path(request.path).await? {
            return Ok((record, ResolvedFrom::PathParam));
        }

        if let Some(slug) = &self.config.default_tenant {
            let record = self
                .registry
                .find_by_slug(slug)
                .await?
                .ok_or_else(|| TenancyError::unknown_tenant(ResolvedFrom::Default, slug.clone()))?;
            return Ok((record, ResolvedFrom::Default));
        }

        Err(TenancyError::missing_tenant())
    }

    fn header_value<'a>(&self, request: &ResolutionRequest<'a>) -> Option<&'a str> {
        if !self.config.trust_tenant_header {
            return None;
        }
        request.tenant_header.map(str::trim).filter(|v| !v.is_empty())
    }

    /// Header values may carry either a tenant id or a slug
    async fn lookup_header(&self, value: &str) -> Result<Option<Arc<TenantRecord>>, TenancyError> {
        if let Some(id) = TenantId::parse(value) {
            if let Some(record) = self.registry.find_by_id(&id).await? {
                return Ok(Some(record));
            }
        }
        self.registry.find_by_slug(value).await
    }

    async fn from_host(&self, host: Option<&str>) -> Result<Option<Candidate>, TenancyError> {
        let Some(host) = host.map(normalize_host).filter(|h| !h.is_empty()) else {
            return Ok(None);
        };

        if let Some(record) = self.registry.find_by_domain(&host).await? {
            return Ok(Some((record, ResolvedFrom::CustomDomain)));
        }

        let candidates: Vec<&str> = self
            .subdomain_candidates(&host)
            .into_iter()
            .filter(|label| !self.config.is_reserved_subdomain(label))
            .collect();

        for label in &candidates {
            if let Some(record) = self.registry.find_by_slug(label).await? {
                return Ok(Some((record, ResolvedFrom::Subdomain)));
            }
        }

        // Under a configured base domain every label names a tenant
        match candidates.first() {
            Some(label) if !self.config.base_domains.is_empty() => {
                Err(TenancyError::unknown_tenant(ResolvedFrom::Subdomain, *label))
            }
            _ => Ok(None),
        }
    }

    /// Labels left of the base domain, nearest to it first
    fn subdomain_candidates<'h>(&self, host: &'h str) -> Vec<&'h str> {
        if host.parse::<IpAddr>().is_ok() {
            return Vec::new();
        }

        let prefix = if self.config.base_domains.is_empty() {
            // Without configured bases, treat the last two labels as the registrable domain
            let mut dots = host.rmatch_indices('.').map(|(i, _)| i);
            match (dots.next(), dots.next()) {
                (Some(_), Some(cut)) => &host[..cut],
                _ => return Vec::new(),
            }
        } else {
            let base = self.config.base_domains.iter().find(|base| {
                host.len() > base.len() + 1
                    && host.ends_with(base.as_str())
                    && host.as_bytes()[host.len() - base.len() - 1] == b'.'
            });
            match base {
                Some(base) => &host[..host.len() - base.len() - 1],
                None => return Vec::new(),
            }
        };

        prefix.rsplit('.').filter(|label| !label.is_empty()).collect()
    }

    /// A first segment that is not a route root is always a tenant slug
    async fn from_path(&self, path: &str) -> Result<Option<Arc<TenantRecord>>, TenancyError> {
        if !self.config.path_resolution {
            return Ok(None);
        }

        let segment = path.trim_start_matches('/').split('/').next().unwrap_or_default();
        if segment.is_empty() || RESERVED_SLUGS.contains(&segment) {
            return Ok(None);
        }

        match self.registry.find_by_slug(segment).await? {
            Some(record) => Ok(Some(record)),
            None => Err(TenancyError::unknown_tenant(ResolvedFrom::PathParam, segment)),
        }
    }

    async fn audit_disagreement(
        &self,
        chosen: &TenantRecord,
        request: &ResolutionRequest<'_>,
    ) -> Result<(), TenancyError> {
        // Unknown hosts or paths are not a disagreement with the header
        let from_host = self.from_host(request.host).await.ok().flatten();
        let from_path = self
            .from_path(request.path)
            .await
            .ok()
            .flatten()
            .map(|r| (r, ResolvedFrom::PathParam));

        for (other, source) in from_host.into_iter().chain(from_path) {
            if other.id != chosen.id {
                warn!(
                    target: SECURITY_TARGET,
                    header_tenant = %chosen.slug,
                    other_tenant = %other.slug,
                    source = %source,
                    "Tenant header disagrees with request; header wins"
                );
            }
        }

        Ok(())
    }
}

/// Lowercases the host and strips any port and trailing dot
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal, optionally followed by a port
        rest.split(']').next().unwrap_or_default()
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}
