use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use relay_core::{
    echo_with_placeholder_id, CapabilityRequest, FallbackMode, FallbackProvider, HttpMethod,
    ProxyExecutor, Source, TenantContext, Upstream, UpstreamError, UpstreamResponse,
};

/// Scripted upstream: sleeps, then answers.
struct Scripted {
    delay: Duration,
    answer: fn() -> Result<UpstreamResponse, UpstreamError>,
    seen_token: Mutex<Option<String>>,
}

impl Scripted {
    fn new(delay: Duration, answer: fn() -> Result<UpstreamResponse, UpstreamError>) -> Arc<Self> {
        Arc::new(Self {
            delay,
            answer,
            seen_token: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Upstream for Scripted {
    async fn call(
        &self,
        req: &CapabilityRequest,
        _tenant: &TenantContext,
    ) -> Result<UpstreamResponse, UpstreamError> {
        *self.seen_token.lock() = req.forwarded_token().map(str::to_string);
        tokio::time::sleep(self.delay).await;
        (self.answer)()
    }
}

fn ok_metrics() -> Result<UpstreamResponse, UpstreamError> {
    Ok(UpstreamResponse::new(200, json!({"total": 42, "items": []})))
}

fn refused() -> Result<UpstreamResponse, UpstreamError> {
    Err(UpstreamError::Unavailable("connection refused".into()))
}

fn server_error() -> Result<UpstreamResponse, UpstreamError> {
    Ok(UpstreamResponse::new(500, json!({"message": "boom"})))
}

fn not_found() -> Result<UpstreamResponse, UpstreamError> {
    Ok(UpstreamResponse::new(404, json!({"message": "no such campaign"})))
}

fn fallbacks() -> Arc<FallbackProvider> {
    Arc::new(
        FallbackProvider::new()
            .with_static("campaign.metrics", json!({"total": 0, "items": []}))
            .with_template("workflow.submit", echo_with_placeholder_id),
    )
}

fn metrics_request(timeout_ms: u64) -> CapabilityRequest {
    CapabilityRequest::new(
        "campaign.metrics",
        HttpMethod::Get,
        "/tenants/{tenant_id}/metrics",
        timeout_ms,
    )
}

#[tokio::test]
async fn healthy_upstream_is_tagged_upstream() {
    let exec = ProxyExecutor::new(Scripted::new(Duration::ZERO, ok_metrics), fallbacks());
    let res = exec.execute(&metrics_request(1_000), &TenantContext::new("acme")).await;

    assert!(res.success);
    assert_eq!(res.source, Source::Upstream);
    assert_eq!(res.http_status, 200);
    assert_eq!(res.data["total"], 42);
}

#[tokio::test]
async fn slow_upstream_returns_fallback_within_deadline() {
    let exec = ProxyExecutor::new(Scripted::new(Duration::from_secs(5), ok_metrics), fallbacks());

    let started = Instant::now();
    let res = exec.execute(&metrics_request(200), &TenantContext::new("acme")).await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(200 + 300), "took {elapsed:?}");
    assert!(res.success);
    assert_eq!(res.source, Source::Fallback);
    assert_eq!(res.http_status, 200);
    assert_eq!(res.data, json!({"total": 0, "items": []}));
}

#[tokio::test]
async fn connection_failure_and_5xx_use_fallback() {
    type Answer = fn() -> Result<UpstreamResponse, UpstreamError>;
    for answer in [refused as Answer, server_error as Answer] {
        let exec = ProxyExecutor::new(Scripted::new(Duration::ZERO, answer), fallbacks());
        let res = exec.execute(&metrics_request(1_000), &TenantContext::new("acme")).await;
        assert_eq!(res.source, Source::Fallback);
        assert_eq!(res.http_status, 200);
    }
}

#[tokio::test]
async fn missing_fallback_surfaces_gateway_errors() {
    let tenant = TenantContext::new("acme");
    let req = CapabilityRequest::new("media.library", HttpMethod::Get, "/media", 100);

    let slow = ProxyExecutor::new(Scripted::new(Duration::from_secs(5), ok_metrics), fallbacks());
    let res = slow.execute(&req, &tenant).await;
    assert!(!res.success);
    assert_eq!(res.source, Source::Error);
    assert_eq!(res.http_status, 504);
    assert!(res.error.unwrap().contains("timed out"));

    let down = ProxyExecutor::new(Scripted::new(Duration::ZERO, refused), fallbacks());
    let res = down.execute(&req, &tenant).await;
    assert_eq!(res.http_status, 502);
    assert_eq!(res.source, Source::Error);
}

#[tokio::test]
async fn upstream_client_errors_pass_through_verbatim() {
    let exec = ProxyExecutor::new(Scripted::new(Duration::ZERO, not_found), fallbacks());
    let req = CapabilityRequest::new("media.asset", HttpMethod::Get, "/media/x", 1_000);

    let res = exec.execute(&req, &TenantContext::new("acme")).await;
    assert_eq!(res.http_status, 404);
    assert_eq!(res.source, Source::Error);
    assert_eq!(res.data, json!({"message": "no such campaign"}));
}

#[tokio::test]
async fn strict_mode_flags_fallback_data() {
    let exec = ProxyExecutor::new(Scripted::new(Duration::ZERO, refused), fallbacks())
        .with_mode(FallbackMode::Strict);
    let res = exec.execute(&metrics_request(1_000), &TenantContext::new("acme")).await;

    assert!(!res.success);
    assert_eq!(res.source, Source::Fallback);
    assert_eq!(res.http_status, 203);
    assert_eq!(res.data["total"], 0);
    assert!(res.error.is_some());
}

#[tokio::test]
async fn templated_fallback_echoes_submission() {
    let exec = ProxyExecutor::new(Scripted::new(Duration::ZERO, refused), fallbacks());
    let req = CapabilityRequest::new("workflow.submit", HttpMethod::Post, "/workflows", 1_000)
        .with_body(json!({"name": "welcome-series"}));

    let res = exec.execute(&req, &TenantContext::new("acme")).await;
    assert_eq!(res.source, Source::Fallback);
    assert_eq!(res.data["name"], "welcome-series");
    assert_eq!(res.data["status"], "queued");
    assert!(res.data["id"].as_str().is_some_and(|id| id.starts_with("pending-")));
}

#[tokio::test]
async fn bearer_token_forwarded_only_with_passthrough() {
    let upstream = Scripted::new(Duration::ZERO, ok_metrics);
    let exec = ProxyExecutor::new(upstream.clone(), fallbacks());
    let tenant = TenantContext::new("acme");

    let mut req = metrics_request(1_000).with_bearer(Some("caller-token".into()));
    exec.execute(&req, &tenant).await;
    assert_eq!(*upstream.seen_token.lock(), None);

    req.auth_passthrough = true;
    exec.execute(&req, &tenant).await;
    assert_eq!(upstream.seen_token.lock().as_deref(), Some("caller-token"));
}

#[tokio::test]
async fn fallback_is_never_cached() {
    // every call hits the upstream again: no dedup, no memo
    struct Counting(Mutex<u32>);

    #[async_trait]
    impl Upstream for Counting {
        async fn call(
            &self,
            _req: &CapabilityRequest,
            _tenant: &TenantContext,
        ) -> Result<UpstreamResponse, UpstreamError> {
            let mut n = self.0.lock();
            *n += 1;
            if *n == 1 {
                Err(UpstreamError::Unavailable("cold start".into()))
            } else {
                Ok(UpstreamResponse::new(200, Value::from(*n)))
            }
        }
    }

    let upstream = Arc::new(Counting(Mutex::new(0)));
    let exec = ProxyExecutor::new(upstream.clone(), fallbacks());
    let tenant = TenantContext::new("acme");

    assert_eq!(exec.execute(&metrics_request(1_000), &tenant).await.source, Source::Fallback);
    assert_eq!(exec.execute(&metrics_request(1_000), &tenant).await.source, Source::Upstream);
    assert_eq!(*upstream.0.lock(), 2);
}
