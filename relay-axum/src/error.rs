use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_connectors::ConnectorError;
use relay_core::RelayError;
use serde_json::Value;

#[derive(Debug)]
pub struct RelayAxumError(pub anyhow::Error);

impl From<anyhow::Error> for RelayAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<RelayError> for RelayAxumError {
    fn from(e: RelayError) -> Self {
        Self(e.into_anyhow())
    }
}

impl From<ConnectorError> for RelayAxumError {
    fn from(e: ConnectorError) -> Self {
        RelayError::from(e).into()
    }
}

impl IntoResponse for RelayAxumError {
    fn into_response(self) -> Response {
        // RelayErrors keep their status even when wrapped in anyhow context;
        // anything else is a GeneralError.
        let safe = match self.0.chain().find_map(|e| e.downcast_ref::<RelayError>()) {
            Some(relay) => relay.sanitize_for_client(),
            None => {
                tracing::error!(error = ?self.0, "unhandled error");
                RelayError::general_error(self.0.to_string())
            }
        };
        let status = StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(error_body(&safe))).into_response()
    }
}

/// Structured error fields plus the capability envelope fields, so a
/// client can treat every response body the same way.
fn error_body(err: &RelayError) -> Value {
    let mut body = err.to_json();
    body["success"] = Value::Bool(false);
    body["source"] = Value::String("error".into());
    body["error"] = Value::String(err.message.clone());
    body
}
