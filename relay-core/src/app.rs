use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::capability::{CapabilityRequest, HttpMethod, ProxyResult};
use crate::config::{RelayConfig, RelayConfigSnapshot};
use crate::errors::RelayError;
use crate::fallback::FallbackProvider;
use crate::gate::{AccessGate, Navigation, OnboardingGate, Principal};
use crate::proxy::{FallbackMode, ProxyExecutor, Upstream};
use crate::registry::{CapabilityDef, CapabilityRegistry};
use crate::resolver::{ResolverOptions, TenantResolver, TenantStore};
use crate::tenant::{TenantContext, TenantRecord};

struct RelayAppInner {
    config: RelayConfigSnapshot,
    resolver: TenantResolver,
    registry: CapabilityRegistry,
    executor: ProxyExecutor,
    gate: AccessGate,
    onboarding: OnboardingGate,
}

/// RelayApp is the framework-agnostic container for the gateway.
///
/// Holds:
/// - config snapshot
/// - tenant resolver
/// - capability registry
/// - proxy executor (with its fallback table)
/// - access + onboarding gates
#[derive(Clone)]
pub struct RelayApp {
    inner: Arc<RelayAppInner>,
}

/// One capability invocation as received from a transport.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub capability_id: &'a str,
    pub method: HttpMethod,
    pub tenant: &'a TenantContext,
    pub principal: Option<&'a Principal>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub bearer_token: Option<String>,
}

impl<'a> Invocation<'a> {
    pub fn new(capability_id: &'a str, method: HttpMethod, tenant: &'a TenantContext) -> Self {
        Self {
            capability_id,
            method,
            tenant,
            principal: None,
            query: BTreeMap::new(),
            body: None,
            bearer_token: None,
        }
    }

    pub fn principal(mut self, principal: Option<&'a Principal>) -> Self {
        self.principal = principal;
        self
    }

    pub fn query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    pub fn bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }
}

impl RelayApp {
    pub fn builder(store: Arc<dyn TenantStore>, upstream: Arc<dyn Upstream>) -> RelayAppBuilder {
        RelayAppBuilder::new(store, upstream)
    }

    pub fn config(&self) -> &RelayConfigSnapshot {
        &self.inner.config
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.inner.resolver
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.inner.registry
    }

    pub fn executor(&self) -> &ProxyExecutor {
        &self.inner.executor
    }

    pub fn gate(&self) -> &AccessGate {
        &self.inner.gate
    }

    pub fn onboarding(&self) -> &OnboardingGate {
        &self.inner.onboarding
    }

    /// Look up a capability, run the access checks and execute it.
    ///
    /// Errors are caller errors only (unknown capability, wrong method,
    /// gate denial, missing path parameter). Upstream failures come back
    /// as a degraded `ProxyResult`.
    pub async fn run_capability(&self, call: Invocation<'_>) -> Result<ProxyResult, RelayError> {
        let def = self.exposed_capability(call.capability_id)?;

        if def.method != call.method {
            return Err(RelayError::method_not_allowed(format!(
                "Capability {} expects {}, got {}",
                def.id, def.method, call.method
            )));
        }

        if let Some(required) = def.required_role {
            self.inner.gate.require(required, call.tenant, call.principal)?;
        }
        if let Some(feature) = def.required_feature.as_deref() {
            self.inner.gate.require_feature(call.tenant, feature)?;
        }

        let mut req = def.request();
        req.query = call.query;
        req.body = call.body;
        req.bearer_token = call.bearer_token;

        // surfaces missing placeholders as a 400 before anything goes out
        req.render_path(call.tenant)?;

        debug!(
            capability_id = %def.id,
            tenant_id = %call.tenant.tenant_id,
            method = %def.method,
            "executing capability"
        );
        Ok(self.inner.executor.execute(&req, call.tenant).await)
    }

    /// Execute a prepared request directly, skipping the gate.
    pub async fn execute(&self, req: &CapabilityRequest, tenant: &TenantContext) -> ProxyResult {
        self.inner.executor.execute(req, tenant).await
    }

    pub fn capability(&self, id: &str) -> Result<&Arc<CapabilityDef>, RelayError> {
        self.inner
            .registry
            .get(id)
            .ok_or_else(|| RelayError::not_found(format!("Unknown capability: {id}")))
    }

    /// Like [`RelayApp::capability`], but internal capabilities are unknown.
    pub fn exposed_capability(&self, id: &str) -> Result<&Arc<CapabilityDef>, RelayError> {
        match self.inner.registry.get(id) {
            Some(def) if !def.internal => Ok(def),
            _ => Err(RelayError::not_found(format!("Unknown capability: {id}"))),
        }
    }

    pub fn navigate(
        &self,
        path: &str,
        tenant: &TenantContext,
        user: Option<&Principal>,
    ) -> Navigation {
        self.inner.onboarding.check(path, tenant, user)
    }
}

pub struct RelayAppBuilder {
    config: RelayConfig,
    store: Arc<dyn TenantStore>,
    upstream: Arc<dyn Upstream>,
    registry: CapabilityRegistry,
    fallbacks: FallbackProvider,
    default_tenant: Option<TenantRecord>,
    onboarding: Option<OnboardingGate>,
}

impl RelayAppBuilder {
    pub fn new(store: Arc<dyn TenantStore>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            config: RelayConfig::new(),
            store,
            upstream,
            registry: CapabilityRegistry::new(),
            fallbacks: FallbackProvider::new(),
            default_tenant: None,
            onboarding: None,
        }
    }

    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capabilities(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn fallbacks(mut self, fallbacks: FallbackProvider) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn default_tenant(mut self, record: TenantRecord) -> Self {
        self.default_tenant = Some(record);
        self
    }

    pub fn onboarding(mut self, gate: OnboardingGate) -> Self {
        self.onboarding = Some(gate);
        self
    }

    /// Reads `fallback.mode`, `tenants.cache_ttl_ms` and `onboarding.path`.
    pub fn build(self) -> Result<RelayApp> {
        let config = self.config.snapshot();

        let mode = match config.get("fallback.mode") {
            Some(raw) => raw.parse::<FallbackMode>().map_err(RelayError::into_anyhow)?,
            None => FallbackMode::default(),
        };

        let mut options = ResolverOptions::default();
        if let Some(ttl) = config.get_duration_ms("tenants.cache_ttl_ms") {
            options.cache_ttl = ttl;
        }
        if let Some(record) = self.default_tenant {
            options.default_tenant = record;
        }

        let onboarding = match (self.onboarding, config.get("onboarding.path")) {
            (Some(gate), _) => gate,
            (None, Some(path)) => OnboardingGate::default().with_onboarding_path(path),
            (None, None) => OnboardingGate::default(),
        };

        let executor =
            ProxyExecutor::new(self.upstream, Arc::new(self.fallbacks)).with_mode(mode);

        Ok(RelayApp {
            inner: Arc::new(RelayAppInner {
                resolver: TenantResolver::new(self.store, options),
                registry: self.registry,
                executor,
                gate: AccessGate::new(),
                onboarding,
                config,
            }),
        })
    }
}
