//! Fallback Provider.
//!
//! A table of capability id to degraded payload. Payloads are static JSON or
//! a template computed from the request. Templates are plain functions: they
//! must not perform I/O.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::capability::CapabilityRequest;

pub type FallbackTemplate = Arc<dyn Fn(&CapabilityRequest) -> Value + Send + Sync>;

#[derive(Clone)]
pub enum FallbackPayload {
    Static(Value),
    Templated(FallbackTemplate),
}

impl FallbackPayload {
    pub fn render(&self, req: &CapabilityRequest) -> Value {
        match self {
            FallbackPayload::Static(v) => v.clone(),
            FallbackPayload::Templated(f) => f(req),
        }
    }
}

impl fmt::Debug for FallbackPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackPayload::Static(v) => f.debug_tuple("Static").field(v).finish(),
            FallbackPayload::Templated(_) => f.write_str("Templated(..)"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct FallbackProvider {
    table: HashMap<String, FallbackPayload>,
}

impl FallbackProvider {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn register_static(&mut self, capability_id: impl Into<String>, payload: Value) {
        self.table
            .insert(capability_id.into(), FallbackPayload::Static(payload));
    }

    pub fn register_template<F>(&mut self, capability_id: impl Into<String>, template: F)
    where
        F: Fn(&CapabilityRequest) -> Value + Send + Sync + 'static,
    {
        self.table
            .insert(capability_id.into(), FallbackPayload::Templated(Arc::new(template)));
    }

    pub fn with_static(mut self, capability_id: impl Into<String>, payload: Value) -> Self {
        self.register_static(capability_id, payload);
        self
    }

    pub fn with_template<F>(mut self, capability_id: impl Into<String>, template: F) -> Self
    where
        F: Fn(&CapabilityRequest) -> Value + Send + Sync + 'static,
    {
        self.register_template(capability_id, template);
        self
    }

    /// Payload for `capability_id`, rendered against `req`.
    pub fn get(&self, capability_id: &str, req: &CapabilityRequest) -> Option<Value> {
        self.table.get(capability_id).map(|p| p.render(req))
    }

    pub fn contains(&self, capability_id: &str) -> bool {
        self.table.contains_key(capability_id)
    }

    pub fn capability_ids(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(|k| k.as_str())
    }
}

/// Template echoing the submitted object with a placeholder id and a
/// `queued` status, for write capabilities whose upstream returns the stored
/// entity.
pub fn echo_with_placeholder_id(req: &CapabilityRequest) -> Value {
    let mut out = match &req.body {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    out.insert(
        "id".to_string(),
        Value::String(format!("pending-{}", Uuid::new_v4())),
    );
    out.insert("status".to_string(), Value::String("queued".to_string()));
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::HttpMethod;
    use serde_json::json;

    #[test]
    fn static_and_templated_lookup() {
        let provider = FallbackProvider::new()
            .with_static("tenant.dashboard", json!({"widgets": []}))
            .with_template("workflow.submit", echo_with_placeholder_id);

        let req = CapabilityRequest::new("workflow.submit", HttpMethod::Post, "/workflows", 30_000)
            .with_body(json!({"name": "welcome", "id": "client-supplied"}));

        assert_eq!(
            provider.get("tenant.dashboard", &req),
            Some(json!({"widgets": []}))
        );

        let echoed = provider.get("workflow.submit", &req).unwrap();
        assert_eq!(echoed["name"], "welcome");
        assert_eq!(echoed["status"], "queued");
        assert!(echoed["id"].as_str().unwrap().starts_with("pending-"));

        assert_eq!(provider.get("media.library", &req), None);
    }
}
