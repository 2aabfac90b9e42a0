//! Proxy Executor.
//!
//! One upstream call per capability request, bounded by the request's
//! `timeout_ms`. Any failure (deadline, connection, non-2xx) consults the
//! [`FallbackProvider`]; the result always says where its data came from.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::capability::{CapabilityRequest, ProxyResult, Source};
use crate::errors::RelayError;
use crate::fallback::FallbackProvider;
use crate::tenant::TenantContext;

/// Raw upstream answer. Any status; the executor decides what counts as
/// success.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("upstream answered {status}")]
    Status { status: u16, body: Value },
}

impl UpstreamError {
    /// Status to report when no fallback covers the failure.
    pub fn http_status(&self) -> u16 {
        match self {
            UpstreamError::Timeout { .. } => 504,
            UpstreamError::Unavailable(_) => 502,
            UpstreamError::Status { status, .. } if *status >= 500 => 502,
            UpstreamError::Status { status, .. } => *status,
        }
    }

    fn into_data(self) -> Value {
        match self {
            UpstreamError::Status { body, .. } => body,
            _ => Value::Null,
        }
    }
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        let status = err.http_status();
        let message = err.to_string();
        let data = match &err {
            UpstreamError::Status { body, .. } if !body.is_null() => Some(body.clone()),
            _ => None,
        };
        let relay = RelayError::new(crate::errors::ErrorKind::from_status(status), message);
        match data {
            Some(d) => relay.with_data(d),
            None => relay,
        }
    }
}

/// The central Gateway, or anything standing in for it.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Perform the call. Implementations attach the tenant id and, when
    /// `req.forwarded_token()` is set, the caller's bearer token.
    async fn call(
        &self,
        req: &CapabilityRequest,
        tenant: &TenantContext,
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// How fallback data is reported to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackMode {
    /// Fallback data is a success (`success: true`, HTTP 200).
    #[default]
    Permissive,
    /// Fallback data is served but flagged (`success: false`, HTTP 203).
    Strict,
}

impl FallbackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackMode::Permissive => "permissive",
            FallbackMode::Strict => "strict",
        }
    }
}

impl fmt::Display for FallbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FallbackMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(FallbackMode::Permissive),
            "strict" => Ok(FallbackMode::Strict),
            other => Err(RelayError::bad_request(format!(
                "Unknown fallback mode: {other} (expected permissive or strict)"
            ))),
        }
    }
}

pub struct ProxyExecutor {
    upstream: Arc<dyn Upstream>,
    fallbacks: Arc<FallbackProvider>,
    mode: FallbackMode,
}

impl ProxyExecutor {
    pub fn new(upstream: Arc<dyn Upstream>, fallbacks: Arc<FallbackProvider>) -> Self {
        Self {
            upstream,
            fallbacks,
            mode: FallbackMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: FallbackMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> FallbackMode {
        self.mode
    }

    pub fn fallbacks(&self) -> &FallbackProvider {
        &self.fallbacks
    }

    /// Run one capability request. Never returns an error: failures become
    /// fallback data or a `source: error` result.
    ///
    /// The upstream future is dropped at the deadline, so a late answer is
    /// never observed.
    pub async fn execute(&self, req: &CapabilityRequest, tenant: &TenantContext) -> ProxyResult {
        let started = Instant::now();
        let deadline = Duration::from_millis(req.timeout_ms);

        let outcome = match tokio::time::timeout(deadline, self.upstream.call(req, tenant)).await {
            Ok(Ok(resp)) if resp.is_success() => {
                debug!(
                    capability_id = %req.capability_id,
                    tenant_id = %tenant.tenant_id,
                    status = resp.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "upstream ok"
                );
                return ProxyResult::upstream(resp.body, resp.status);
            }
            Ok(Ok(resp)) => UpstreamError::Status {
                status: resp.status,
                body: resp.body,
            },
            Ok(Err(err)) => err,
            Err(_) => UpstreamError::Timeout {
                after_ms: req.timeout_ms,
            },
        };

        self.recover(req, tenant, outcome)
    }

    fn recover(
        &self,
        req: &CapabilityRequest,
        tenant: &TenantContext,
        failure: UpstreamError,
    ) -> ProxyResult {
        match self.fallbacks.get(&req.capability_id, req) {
            Some(data) => {
                warn!(
                    capability_id = %req.capability_id,
                    tenant_id = %tenant.tenant_id,
                    reason = %failure,
                    mode = %self.mode,
                    "serving fallback"
                );
                match self.mode {
                    FallbackMode::Permissive => ProxyResult {
                        success: true,
                        data,
                        source: Source::Fallback,
                        http_status: 200,
                        error: None,
                    },
                    FallbackMode::Strict => ProxyResult {
                        success: false,
                        data,
                        source: Source::Fallback,
                        http_status: 203,
                        error: Some(failure.to_string()),
                    },
                }
            }
            None => {
                warn!(
                    capability_id = %req.capability_id,
                    tenant_id = %tenant.tenant_id,
                    reason = %failure,
                    "upstream failed and no fallback is registered"
                );
                let http_status = failure.http_status();
                let error = failure.to_string();
                ProxyResult {
                    success: false,
                    data: failure.into_data(),
                    source: Source::Error,
                    http_status,
                    error: Some(error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_statuses_without_fallback() {
        assert_eq!(UpstreamError::Timeout { after_ms: 10 }.http_status(), 504);
        assert_eq!(UpstreamError::Unavailable("refused".into()).http_status(), 502);
        assert_eq!(
            UpstreamError::Status { status: 503, body: Value::Null }.http_status(),
            502
        );
        assert_eq!(
            UpstreamError::Status { status: 404, body: Value::Null }.http_status(),
            404
        );
    }

    #[test]
    fn upstream_error_converts_to_relay_error() {
        let err: RelayError = UpstreamError::Status {
            status: 422,
            body: json!({"field": "bad"}),
        }
        .into();
        assert_eq!(err.code(), 422);
        assert_eq!(err.data.unwrap()["field"], "bad");

        let timeout: RelayError = UpstreamError::Timeout { after_ms: 5 }.into();
        assert_eq!(timeout.code(), 504);
    }

    #[test]
    fn fallback_mode_parses() {
        assert_eq!("STRICT".parse::<FallbackMode>().unwrap(), FallbackMode::Strict);
        assert_eq!(" permissive ".parse::<FallbackMode>().unwrap(), FallbackMode::Permissive);
        assert!("lenient".parse::<FallbackMode>().is_err());
    }
}
