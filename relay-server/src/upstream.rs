use std::time::Duration;

use async_trait::async_trait;
use relay_core::{
    CapabilityRequest, HttpMethod, TenantContext, Upstream, UpstreamError, UpstreamResponse,
};
use reqwest::{Client, Method};
use serde_json::Value;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// The central Gateway, reached over HTTP.
pub struct HttpUpstream {
    client: Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("gateway.base_url is empty");
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn method(m: HttpMethod) -> Method {
    match m {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// JSON when it parses, the raw text otherwise, `null` when empty.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn call(
        &self,
        req: &CapabilityRequest,
        tenant: &TenantContext,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let path = req
            .render_path(tenant)
            .map_err(|e| UpstreamError::Unavailable(e.message))?;
        let url = format!("{}{}", self.base_url, path);

        let mut builder = self
            .client
            .request(method(req.method), &url)
            .timeout(Duration::from_millis(req.timeout_ms))
            .header(TENANT_HEADER, tenant.tenant_id.as_str())
            .query(&req.query);
        if let Some(token) = req.forwarded_token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let res = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout {
                    after_ms: req.timeout_ms,
                }
            } else {
                UpstreamError::Unavailable(e.to_string())
            }
        })?;

        let status = res.status().as_u16();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| UpstreamError::Unavailable(format!("reading response body: {e}")))?;
        Ok(UpstreamResponse::new(status, decode_body(&bytes)))
    }
}
