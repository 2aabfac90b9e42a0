use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::capability::{CapabilityRequest, HttpMethod};
use crate::gate::Role;
use crate::schema::Shape;

/// Declarative description of one capability.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityDef {
    pub id: String,
    pub method: HttpMethod,
    pub path_template: String,
    pub timeout_ms: u64,
    /// Minimum role; `None` means anonymous callers are served.
    pub required_role: Option<Role>,
    pub required_feature: Option<String>,
    pub auth_passthrough: bool,
    /// Reachable only through [`crate::RelayApp::execute`], never from a
    /// transport.
    pub internal: bool,
    /// Shape of the upstream success payload.
    #[serde(skip)]
    pub shape: Shape,
}

impl CapabilityDef {
    pub fn new(id: impl Into<String>, method: HttpMethod, path_template: impl Into<String>) -> Self {
        let timeout_ms = if method.is_write() { 30_000 } else { 5_000 };
        Self {
            id: id.into(),
            method,
            path_template: path_template.into(),
            timeout_ms,
            required_role: None,
            required_feature: None,
            auth_passthrough: false,
            internal: false,
            shape: Shape::Any,
        }
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn requires_role(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn requires_feature(mut self, feature: impl Into<String>) -> Self {
        self.required_feature = Some(feature.into());
        self
    }

    pub fn passthrough_auth(mut self) -> Self {
        self.auth_passthrough = true;
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    /// Fresh request for this capability.
    pub fn request(&self) -> CapabilityRequest {
        let mut req = CapabilityRequest::new(
            self.id.clone(),
            self.method,
            self.path_template.clone(),
            self.timeout_ms,
        );
        req.auth_passthrough = self.auth_passthrough;
        req
    }
}

/// Maps capability ids to their definitions.
#[derive(Debug, Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<CapabilityDef>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: BTreeMap::new(),
        }
    }

    /// Register a capability; a later registration replaces an earlier one.
    pub fn register(&mut self, def: CapabilityDef) {
        self.capabilities.insert(def.id.clone(), Arc::new(def));
    }

    pub fn with(mut self, def: CapabilityDef) -> Self {
        self.register(def);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Arc<CapabilityDef>> {
        self.capabilities.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CapabilityDef>> {
        self.capabilities.values()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
