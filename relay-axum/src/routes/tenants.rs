use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use relay_core::{Navigation, RelayError, Role, TenantId};
use serde::Deserialize;
use serde_json::json;

use crate::params::{mark_degraded, require_user, RequestContext};
use crate::{RelayAxumError, RelayAxumState};

pub fn router() -> Router<RelayAxumState> {
    Router::new()
        .route("/tenant-context", routing::get(tenant_context))
        .route("/tenant-context/invalidate", routing::post(invalidate))
        .route("/tenants", routing::get(list_tenants))
        .route("/navigation", routing::get(navigation))
}

#[derive(Debug, Deserialize)]
struct DomainQuery {
    domain: Option<String>,
}

/// Resolve `?domain=` (or the request itself when absent) to its tenant.
async fn tenant_context(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
    Query(q): Query<DomainQuery>,
) -> Response {
    let tenant = match q.domain.as_deref() {
        Some(domain) => state.app.resolver().resolve_host(domain).await,
        None => ctx.tenant.clone(),
    };
    mark_degraded(&tenant, Json(tenant.as_ref()).into_response())
}

#[derive(Debug, Deserialize)]
struct InvalidateQuery {
    tenant_id: Option<String>,
}

async fn invalidate(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
    Query(q): Query<InvalidateQuery>,
) -> Result<Response, RelayAxumError> {
    require_super_admin(&state, &ctx)?;
    let resolver = state.app.resolver();
    match q.tenant_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => resolver.invalidate_tenant(&TenantId::new(id)),
        None => resolver.invalidate_all(),
    }
    Ok(Json(json!({ "invalidated": q.tenant_id.unwrap_or_else(|| "*".into()) })).into_response())
}

async fn list_tenants(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
) -> Result<Response, RelayAxumError> {
    require_super_admin(&state, &ctx)?;
    let records = state
        .app
        .resolver()
        .store()
        .list()
        .await
        .map_err(|e| RelayError::unavailable("Tenant store is unavailable").with_source(e))?;
    Ok(Json(json!({ "data": records })).into_response())
}

#[derive(Debug, Deserialize)]
struct NavigationQuery {
    path: String,
}

/// Where the caller should land when navigating to `?path=`.
async fn navigation(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
    Query(q): Query<NavigationQuery>,
) -> Response {
    let redirect_to = match state.app.navigate(&q.path, &ctx.tenant, ctx.principal()) {
        Navigation::Proceed => None,
        Navigation::Redirect { to } => Some(to),
    };
    ctx.mark(Json(json!({ "redirect_to": redirect_to })).into_response())
}

fn require_super_admin(state: &RelayAxumState, ctx: &RequestContext) -> Result<(), RelayError> {
    let user = require_user(ctx)?;
    state.app.gate().require(Role::SuperAdmin, &ctx.tenant, Some(user))
}
