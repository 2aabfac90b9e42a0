//! Tenant resolution.
//!
//! Maps an inbound request (explicit tenant header or `Host`) to a
//! [`TenantContext`]. Resolution never fails: unknown hosts get the
//! configured default tenant, and an unreachable store yields the default
//! tenant flagged `degraded`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::tenant::{TenantContext, TenantId, TenantRecord};

/// External tenant configuration store.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Look a tenant up by id.
    async fn get(&self, id: &TenantId) -> Result<Option<TenantRecord>>;

    /// Exact (non-wildcard) domain match. `host` is already normalized.
    async fn find_by_domain(&self, host: &str) -> Result<Option<TenantRecord>>;

    /// Every registered wildcard pattern (`*.brand.test`) with its owner.
    async fn wildcard_domains(&self) -> Result<Vec<(String, TenantId)>>;

    /// All tenant records.
    async fn list(&self) -> Result<Vec<TenantRecord>>;
}

/// In-process tenant store, records addressed by id.
#[derive(Default)]
pub struct MemoryTenantStore {
    records: DashMap<TenantId, TenantRecord>,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = TenantRecord>,
    {
        let store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    pub fn upsert(&self, record: TenantRecord) {
        self.records.insert(record.tenant_id.clone(), record);
    }

    pub fn remove(&self, id: &TenantId) -> Option<TenantRecord> {
        self.records.remove(id).map(|(_, r)| r)
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn get(&self, id: &TenantId) -> Result<Option<TenantRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn find_by_domain(&self, host: &str) -> Result<Option<TenantRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| {
                r.domains
                    .iter()
                    .filter(|d| !d.starts_with("*."))
                    .any(|d| normalize_host(d) == host)
            })
            .map(|r| r.value().clone()))
    }

    async fn wildcard_domains(&self) -> Result<Vec<(String, TenantId)>> {
        let mut out = Vec::new();
        for r in self.records.iter() {
            for d in r.domains.iter().filter(|d| d.starts_with("*.")) {
                out.push((d.to_ascii_lowercase(), r.tenant_id.clone()));
            }
        }
        Ok(out)
    }

    async fn list(&self) -> Result<Vec<TenantRecord>> {
        let mut out: Vec<TenantRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(out)
    }
}

/// Lowercase, drop the port and any trailing dot.
pub fn normalize_host(raw: &str) -> String {
    let host = raw.trim().to_ascii_lowercase();
    let host = if host.starts_with('[') {
        // [::1]:8080
        match host.find(']') {
            Some(end) => host[..=end].to_string(),
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h.to_string(),
            _ => host,
        }
    };
    host.trim_end_matches('.').to_string()
}

/// Longest-suffix match of `host` against `*.suffix` patterns.
///
/// `*.acme.test` matches `shop.acme.test` and `eu.shop.acme.test`, never
/// `acme.test` itself.
pub fn match_wildcard<'a>(host: &str, patterns: &'a [(String, TenantId)]) -> Option<&'a TenantId> {
    patterns
        .iter()
        .filter_map(|(pattern, id)| {
            let suffix = pattern.strip_prefix('*')?;
            (host.len() > suffix.len() && host.ends_with(suffix)).then_some((suffix.len(), id))
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, id)| id)
}

/// What the request told us about its tenant.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantHint<'a> {
    /// Explicit tenant id (header or query parameter).
    pub tenant_id: Option<&'a str>,
    /// `Host` header.
    pub host: Option<&'a str>,
}

impl<'a> TenantHint<'a> {
    pub fn host(host: &'a str) -> Self {
        Self { tenant_id: None, host: Some(host) }
    }

    pub fn explicit(tenant_id: &'a str) -> Self {
        Self { tenant_id: Some(tenant_id), host: None }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub cache_ttl: Duration,
    /// Upper bound on a single store call before the store counts as
    /// unreachable.
    pub store_timeout: Duration,
    pub default_tenant: TenantRecord,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            store_timeout: Duration::from_millis(500),
            default_tenant: TenantRecord::new("default", "Relay")
                .with_features(["dashboard"]),
        }
    }
}

struct CachedTenant {
    ctx: Arc<TenantContext>,
    expires_at: Instant,
}

enum Lookup {
    Found(TenantRecord),
    Missing,
    StoreDown,
}

pub struct TenantResolver {
    store: Arc<dyn TenantStore>,
    options: ResolverOptions,
    default_ctx: Arc<TenantContext>,
    degraded_ctx: Arc<TenantContext>,
    cache: DashMap<String, CachedTenant>,
}

impl TenantResolver {
    pub fn new(store: Arc<dyn TenantStore>, options: ResolverOptions) -> Self {
        let default_ctx = TenantContext::from_record(&options.default_tenant);
        let degraded_ctx = default_ctx.clone().into_degraded();
        Self {
            store,
            options,
            default_ctx: Arc::new(default_ctx),
            degraded_ctx: Arc::new(degraded_ctx),
            cache: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    pub fn default_context(&self) -> Arc<TenantContext> {
        Arc::clone(&self.default_ctx)
    }

    /// Resolve a request to its tenant. The explicit id wins over the host;
    /// an unknown explicit id falls through to host inference.
    pub async fn resolve(&self, hint: TenantHint<'_>) -> Arc<TenantContext> {
        if let Some(id) = hint.tenant_id.map(str::trim).filter(|s| !s.is_empty()) {
            let key = format!("id:{id}");
            if let Some(ctx) = self.cached(&key) {
                return ctx;
            }
            match self.lookup_id(&TenantId::new(id)).await {
                Lookup::Found(record) => return self.remember(key, &record),
                Lookup::StoreDown => return self.degraded(),
                Lookup::Missing => {
                    debug!(tenant_id = id, "explicit tenant not registered, falling back to host");
                }
            }
        }

        match hint.host {
            Some(host) => self.resolve_host(host).await,
            None => self.default_context(),
        }
    }

    pub async fn resolve_host(&self, raw_host: &str) -> Arc<TenantContext> {
        let host = normalize_host(raw_host);
        if host.is_empty() {
            return self.default_context();
        }

        let key = format!("host:{host}");
        if let Some(ctx) = self.cached(&key) {
            return ctx;
        }

        match self.lookup_host(&host).await {
            Lookup::Found(record) => self.remember(key, &record),
            // unknown hosts are never cached
            Lookup::Missing => {
                debug!(host = %host, "unknown host, serving default tenant");
                self.default_context()
            }
            Lookup::StoreDown => self.degraded(),
        }
    }

    /// Drop every cached resolution.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Drop cached resolutions that point at `tenant_id`.
    pub fn invalidate_tenant(&self, tenant_id: &TenantId) {
        self.cache.retain(|_, entry| &entry.ctx.tenant_id != tenant_id);
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn cached(&self, key: &str) -> Option<Arc<TenantContext>> {
        let entry = self.cache.get(key)?;
        if entry.expires_at > Instant::now() {
            debug!(key, "tenant cache hit");
            return Some(Arc::clone(&entry.ctx));
        }
        drop(entry);
        self.cache.remove(key);
        None
    }

    fn remember(&self, key: String, record: &TenantRecord) -> Arc<TenantContext> {
        let ctx = Arc::new(TenantContext::from_record(record));
        let now = Instant::now();
        // sweep expired entries on every insert
        self.cache.retain(|_, entry| entry.expires_at > now);
        self.cache.insert(
            key,
            CachedTenant {
                ctx: Arc::clone(&ctx),
                expires_at: now + self.options.cache_ttl,
            },
        );
        ctx
    }

    fn degraded(&self) -> Arc<TenantContext> {
        Arc::clone(&self.degraded_ctx)
    }

    async fn lookup_id(&self, id: &TenantId) -> Lookup {
        match tokio::time::timeout(self.options.store_timeout, self.store.get(id)).await {
            Ok(Ok(Some(record))) => Lookup::Found(record),
            Ok(Ok(None)) => Lookup::Missing,
            Ok(Err(err)) => {
                warn!(tenant_id = %id, error = %err, "tenant store failed, serving degraded default");
                Lookup::StoreDown
            }
            Err(_) => {
                warn!(tenant_id = %id, "tenant store timed out, serving degraded default");
                Lookup::StoreDown
            }
        }
    }

    async fn lookup_host(&self, host: &str) -> Lookup {
        let store = &self.store;
        let search = async {
            if let Some(record) = store.find_by_domain(host).await? {
                return Ok::<_, anyhow::Error>(Some(record));
            }
            let patterns = store.wildcard_domains().await?;
            match match_wildcard(host, &patterns) {
                Some(id) => store.get(id).await,
                None => Ok(None),
            }
        };

        match tokio::time::timeout(self.options.store_timeout, search).await {
            Ok(Ok(Some(record))) => Lookup::Found(record),
            Ok(Ok(None)) => Lookup::Missing,
            Ok(Err(err)) => {
                warn!(host, error = %err, "tenant store failed, serving degraded default");
                Lookup::StoreDown
            }
            Err(_) => {
                warn!(host, "tenant store timed out, serving degraded default");
                Lookup::StoreDown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_port_case_and_trailing_dot() {
        assert_eq!(normalize_host("Shop.Acme.TEST:8443"), "shop.acme.test");
        assert_eq!(normalize_host("acme.test."), "acme.test");
        assert_eq!(normalize_host("[::1]:3000"), "[::1]");
        assert_eq!(normalize_host("  "), "");
    }

    #[test]
    fn wildcard_prefers_longest_suffix() {
        let patterns = vec![
            ("*.acme.test".to_string(), TenantId::from("acme")),
            ("*.eu.acme.test".to_string(), TenantId::from("acme-eu")),
        ];

        assert_eq!(match_wildcard("shop.acme.test", &patterns), Some(&TenantId::from("acme")));
        assert_eq!(
            match_wildcard("shop.eu.acme.test", &patterns),
            Some(&TenantId::from("acme-eu"))
        );
        assert_eq!(match_wildcard("acme.test", &patterns), None);
        assert_eq!(match_wildcard("notacme.test", &patterns), None);
    }
}
