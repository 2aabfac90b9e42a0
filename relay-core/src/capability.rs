//! Capability requests, proxy results and the response envelope.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelayError;
use crate::tenant::TenantContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Methods that change state upstream.
    pub fn is_write(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(RelayError::method_not_allowed(format!("Unsupported method: {other}"))),
        }
    }
}

/// One proxy call. Built per request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub capability_id: String,
    pub method: HttpMethod,
    /// Upstream path with `{placeholder}` segments.
    pub path_template: String,
    #[serde(default)]
    pub path_params: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    pub timeout_ms: u64,
    #[serde(default)]
    pub auth_passthrough: bool,
    /// Caller's bearer token, forwarded verbatim when `auth_passthrough`.
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<String>,
}

impl CapabilityRequest {
    pub fn new(
        capability_id: impl Into<String>,
        method: HttpMethod,
        path_template: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            capability_id: capability_id.into(),
            method,
            path_template: path_template.into(),
            path_params: BTreeMap::new(),
            query: BTreeMap::new(),
            body: None,
            timeout_ms,
            auth_passthrough: false,
            bearer_token: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_path_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(key.into(), value.into());
        self
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    /// Token to forward upstream, if passthrough is enabled.
    pub fn forwarded_token(&self) -> Option<&str> {
        if self.auth_passthrough {
            self.bearer_token.as_deref()
        } else {
            None
        }
    }

    /// Substitute `{name}` placeholders from `path_params`, then `query`.
    /// `{tenant_id}` falls back to the tenant context, never to the query.
    pub fn render_path(&self, tenant: &TenantContext) -> Result<String, RelayError> {
        let mut out = String::with_capacity(self.path_template.len());
        let mut rest = self.path_template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                RelayError::general_error(format!(
                    "Unterminated placeholder in path template for {}",
                    self.capability_id
                ))
            })?;
            let name = &after[..close];
            // the caller's query never picks the tenant
            let implicit = || match name {
                "tenant_id" => Some(tenant.tenant_id.as_str()),
                _ => self.query.get(name).map(String::as_str),
            };
            let value = self
                .path_params
                .get(name)
                .map(String::as_str)
                .or_else(implicit)
                .ok_or_else(|| {
                    RelayError::bad_request(format!("Missing path parameter: {name}"))
                        .with_errors(serde_json::json!({ name: ["is required"] }))
                })?;
            out.push_str(&urlencoding::encode(value));
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Provenance of a proxy result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Upstream,
    Fallback,
    Error,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Upstream => "upstream",
            Source::Fallback => "fallback",
            Source::Error => "error",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResult {
    pub success: bool,
    pub data: Value,
    pub source: Source,
    pub http_status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProxyResult {
    pub fn upstream(data: Value, http_status: u16) -> Self {
        Self {
            success: true,
            data,
            source: Source::Upstream,
            http_status,
            error: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.source != Source::Upstream
    }

    pub fn into_envelope(self) -> Envelope {
        Envelope {
            success: self.success,
            data: self.data,
            source: self.source,
            error: self.error,
        }
    }
}

/// Response body shared by every capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub data: Value,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ProxyResult> for Envelope {
    fn from(result: ProxyResult) -> Self {
        result.into_envelope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_path_fills_tenant_and_params() {
        let tenant = TenantContext::new("acme");
        let req = CapabilityRequest::new(
            "campaign.metrics",
            HttpMethod::Get,
            "/tenants/{tenant_id}/campaigns/{campaign_id}/metrics",
            5_000,
        )
        .with_query("campaign_id", "c 1");

        assert_eq!(req.render_path(&tenant).unwrap(), "/tenants/acme/campaigns/c%201/metrics");
    }

    #[test]
    fn query_cannot_retarget_tenant() {
        let tenant = TenantContext::new("acme");
        let req = CapabilityRequest::new("x", HttpMethod::Get, "/tenants/{tenant_id}/media", 1_000)
            .with_query("tenant_id", "globex");
        assert_eq!(req.render_path(&tenant).unwrap(), "/tenants/acme/media");
    }

    #[test]
    fn path_values_cannot_add_segments() {
        let tenant = TenantContext::new("acme");
        let req = CapabilityRequest::new("x", HttpMethod::Get, "/media/{asset_id}", 1_000)
            .with_path_param("asset_id", "../admin?x=1");
        assert_eq!(req.render_path(&tenant).unwrap(), "/media/..%2Fadmin%3Fx%3D1");
    }

    #[test]
    fn render_path_reports_missing_placeholder() {
        let tenant = TenantContext::new("acme");
        let req = CapabilityRequest::new("x", HttpMethod::Get, "/media/{asset_id}", 1_000);
        let err = req.render_path(&tenant).unwrap_err();
        assert_eq!(err.code(), 400);
        assert_eq!(err.errors.unwrap()["asset_id"][0], "is required");
    }

    #[test]
    fn token_only_forwarded_with_passthrough() {
        let mut req = CapabilityRequest::new("x", HttpMethod::Get, "/x", 1_000)
            .with_bearer(Some("abc".into()));
        assert_eq!(req.forwarded_token(), None);
        req.auth_passthrough = true;
        assert_eq!(req.forwarded_token(), Some("abc"));
    }

    #[test]
    fn envelope_omits_absent_error() {
        let env: Envelope = ProxyResult::upstream(json!({"ok": true}), 200).into();
        let v = serde_json::to_value(env).unwrap();
        assert_eq!(v, json!({"success": true, "data": {"ok": true}, "source": "upstream"}));
    }
}
