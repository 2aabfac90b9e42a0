use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use relay_core::{RelayError, Role};
use serde_json::{json, Map, Value};

use crate::params::{require_user, RequestContext};
use crate::{RelayAxumError, RelayAxumState};

pub fn router() -> Router<RelayAxumState> {
    Router::new()
        .route("/connectors", routing::get(list_types))
        .route("/connectors/instances", routing::get(list_instances))
        .route("/connectors/{connector}/status", routing::get(status))
        .route("/connectors/{connector}/connect", routing::post(connect))
        .route("/connectors/{connector}/disconnect", routing::post(disconnect))
        .route("/connectors/{connector}/sync", routing::post(sync))
}

fn map_json_rejection(rejection: JsonRejection) -> RelayAxumError {
    RelayError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [rejection.to_string()]}))
        .into()
}

/// Members read connector state; admins change it.
fn require(state: &RelayAxumState, ctx: &RequestContext, role: Role) -> Result<(), RelayError> {
    let user = require_user(ctx)?;
    state.app.gate().require(role, &ctx.tenant, Some(user))
}

async fn list_types(State(state): State<RelayAxumState>) -> Response {
    Json(json!({ "data": state.connectors.list_types() })).into_response()
}

async fn list_instances(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
) -> Result<Response, RelayAxumError> {
    require(&state, &ctx, Role::Client)?;
    let instances = state.connectors.instances(&ctx.tenant.tenant_id);
    Ok(ctx.mark(Json(json!({ "data": instances })).into_response()))
}

async fn status(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
    Path(connector): Path<String>,
) -> Result<Response, RelayAxumError> {
    require(&state, &ctx, Role::Client)?;
    let instance = state.connectors.instance(&ctx.tenant.tenant_id, &connector)?;
    Ok(ctx.mark(Json(instance).into_response()))
}

async fn connect(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
    Path(connector): Path<String>,
    form: Result<Json<Value>, JsonRejection>,
) -> Result<Response, RelayAxumError> {
    require(&state, &ctx, Role::Admin)?;
    let Json(form) = form.map_err(map_json_rejection)?;
    let form = credentials_form(form)?;

    let instance = state.connectors.connect(&ctx.tenant, &connector, &form).await?;
    Ok(ctx.mark(Json(instance).into_response()))
}

async fn disconnect(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
    Path(connector): Path<String>,
) -> Result<Response, RelayAxumError> {
    require(&state, &ctx, Role::Admin)?;
    let instance = state
        .connectors
        .disconnect(&ctx.tenant.tenant_id, &connector)
        .await?;
    Ok(ctx.mark(Json(instance).into_response()))
}

async fn sync(
    State(state): State<RelayAxumState>,
    ctx: RequestContext,
    Path(connector): Path<String>,
) -> Result<Response, RelayAxumError> {
    require(&state, &ctx, Role::Admin)?;
    let report = state.connectors.sync(&ctx.tenant, &connector).await?;
    Ok(ctx.mark(Json(report).into_response()))
}

/// Accept `{"credentials": {...}}` or the bare credential object.
fn credentials_form(body: Value) -> Result<Map<String, Value>, RelayError> {
    let body = match body {
        Value::Object(mut obj) => match obj.remove("credentials") {
            Some(Value::Object(inner)) if obj.is_empty() => return Ok(inner),
            Some(other) => {
                obj.insert("credentials".into(), other);
                obj
            }
            None => obj,
        },
        _ => {
            return Err(RelayError::bad_request("Invalid credentials")
                .with_errors(json!({"_schema": ["expected an object"]})))
        }
    };
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_and_bare_forms() {
        let wrapped = credentials_form(json!({"credentials": {"api_key": "k"}})).unwrap();
        assert_eq!(wrapped["api_key"], "k");

        let bare = credentials_form(json!({"api_key": "k"})).unwrap();
        assert_eq!(bare["api_key"], "k");

        assert_eq!(credentials_form(json!([1])).unwrap_err().code(), 400);
    }
}
