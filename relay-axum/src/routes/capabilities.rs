use std::collections::BTreeMap;
use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use relay_core::{HttpMethod, Invocation, RelayError};
use serde_json::{json, Value};

use crate::params::{capability_query, RequestContext};
use crate::{RelayAxumError, RelayAxumState};

pub const SOURCE_HEADER: &str = "x-relay-source";

pub fn router() -> Router<RelayAxumState> {
    Router::new().route("/capabilities/{capability_id}", routing::any(invoke))
}

/// Run one capability for the resolved tenant and answer with its envelope.
///
/// The status is the proxy's `http_status`: 200 for upstream data and
/// permissive fallbacks, 203 for strict fallbacks, the mapped upstream error
/// otherwise. Gate denials carry the degraded flag like any other answer.
async fn invoke(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
    Path(capability_id): Path<String>,
    method: Method,
    Query(query): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Response {
    let res = match run(&state, &ctx, &capability_id, method, query, &body).await {
        Ok(res) => res,
        Err(err) => err.into_response(),
    };
    ctx.mark(res)
}

async fn run(
    state: &RelayAxumState,
    ctx: &RequestContext,
    capability_id: &str,
    method: Method,
    query: BTreeMap<String, String>,
    body: &Bytes,
) -> Result<Response, RelayAxumError> {
    let method = HttpMethod::from_str(method.as_str())?;
    let body = parse_body(body)?;

    let call = Invocation::new(capability_id, method, &ctx.tenant)
        .principal(ctx.principal())
        .query(capability_query(query))
        .body(body)
        .bearer_token(ctx.bearer_token.clone());
    let result = state.app.run_capability(call).await?;

    let status = StatusCode::from_u16(result.http_status).unwrap_or(StatusCode::BAD_GATEWAY);
    let source = HeaderValue::from_static(result.source.as_str());
    let mut res = (status, Json(result.into_envelope())).into_response();
    res.headers_mut().insert(SOURCE_HEADER, source);
    Ok(res)
}

fn parse_body(bytes: &Bytes) -> Result<Option<Value>, RelayError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes).map(Some).map_err(|e| {
        RelayError::bad_request("Failed to parse the request body as JSON")
            .with_errors(json!({"_schema": [e.to_string()]}))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_body_is_none() {
        assert_eq!(parse_body(&Bytes::new()).unwrap(), None);
        assert_eq!(parse_body(&Bytes::from_static(b" \n")).unwrap(), None);
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let err = parse_body(&Bytes::from_static(b"{\"name\":")).unwrap_err();
        assert_eq!(err.code(), 400);
        assert!(err.errors.unwrap()["_schema"].is_array());
    }
}
