use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Query};
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use relay_auth::extract_bearer_token;
use relay_core::{Principal, RelayError, TenantContext, TenantHint};

use crate::{RelayAxumError, RelayAxumState};

/// Headers that name the tenant explicitly, in precedence order.
pub const TENANT_HEADERS: [&str; 2] = ["x-tenant", "x-tenant-id"];
/// Query parameter that names the tenant explicitly.
pub const TENANT_QUERY: &str = "tenant";

pub const DEGRADED_HEADER: &str = "x-tenant-degraded";

/// Who is calling and on behalf of which tenant.
///
/// Resolved once per request: the explicit tenant header or `?tenant=` wins
/// over the `Host` header, and a bearer token is verified into a
/// [`Principal`]. A request without `Authorization` is anonymous; a token
/// that does not verify rejects the request with 401.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant: Arc<TenantContext>,
    pub principal: Option<Principal>,
    pub bearer_token: Option<String>,
}

impl RequestContext {
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn mark(&self, res: Response) -> Response {
        mark_degraded(&self.tenant, res)
    }
}

/// Flag responses served for a stand-in tenant.
pub fn mark_degraded(tenant: &TenantContext, mut res: Response) -> Response {
    if tenant.degraded {
        res.headers_mut()
            .insert(DEGRADED_HEADER, HeaderValue::from_static("true"));
    }
    res
}

impl FromRequestParts<RelayAxumState> for RequestContext {
    type Rejection = RelayAxumError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &RelayAxumState,
    ) -> Result<Self, Self::Rejection> {
        let query: BTreeMap<String, String> = Query::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        let explicit = explicit_tenant(&parts.headers)
            .or_else(|| query.get(TENANT_QUERY).map(String::as_str));
        let hint = TenantHint {
            tenant_id: explicit,
            host: header_str(&parts.headers, HOST.as_str()),
        };
        let tenant = state.app.resolver().resolve(hint).await;

        let principal = state.auth.authenticate(&parts.headers)?;
        let bearer_token = extract_bearer_token(&parts.headers);

        Ok(Self {
            tenant,
            principal,
            bearer_token,
        })
    }
}

fn explicit_tenant(headers: &HeaderMap) -> Option<&str> {
    TENANT_HEADERS
        .iter()
        .find_map(|name| header_str(headers, name))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Capability query parameters with the tenant routing hint removed.
pub fn capability_query(mut query: BTreeMap<String, String>) -> BTreeMap<String, String> {
    query.remove(TENANT_QUERY);
    query
}

pub(crate) fn require_user(ctx: &RequestContext) -> Result<&Principal, RelayError> {
    ctx.principal()
        .ok_or_else(|| RelayError::not_authenticated("Authentication required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_header_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", HeaderValue::from_static("globex"));
        assert_eq!(explicit_tenant(&headers), Some("globex"));

        headers.insert("x-tenant", HeaderValue::from_static("acme"));
        assert_eq!(explicit_tenant(&headers), Some("acme"));

        headers.insert("x-tenant", HeaderValue::from_static("  "));
        assert_eq!(explicit_tenant(&headers), Some("globex"));
    }

    #[test]
    fn tenant_hint_is_not_forwarded() {
        let mut query = BTreeMap::new();
        query.insert("tenant".to_string(), "acme".to_string());
        query.insert("page".to_string(), "2".to_string());
        let query = capability_query(query);
        assert_eq!(query.len(), 1);
        assert_eq!(query["page"], "2");
    }
}
