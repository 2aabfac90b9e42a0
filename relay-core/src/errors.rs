//! Relay's one error type.
//!
//! A [`RelayError`] travels inside `anyhow::Error` from the core up to the
//! transport, which reads its status and JSON form. Validation failures put
//! field-indexed messages in `errors` (`{"client_id": ["is required"]}`).

use std::fmt;

use anyhow::Error as AnyError;
use serde_json::{json, Value};

pub type RelayResult<T> = std::result::Result<T, AnyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotAuthenticated,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    Conflict,
    Unprocessable,
    GeneralError,
    NotImplemented,
    BadGateway,
    Unavailable,
    GatewayTimeout,
}

impl ErrorKind {
    /// (status, name, kebab class name)
    fn parts(&self) -> (u16, &'static str, &'static str) {
        use ErrorKind::*;
        match self {
            BadRequest => (400, "BadRequest", "bad-request"),
            NotAuthenticated => (401, "NotAuthenticated", "not-authenticated"),
            Forbidden => (403, "Forbidden", "forbidden"),
            NotFound => (404, "NotFound", "not-found"),
            MethodNotAllowed => (405, "MethodNotAllowed", "method-not-allowed"),
            Conflict => (409, "Conflict", "conflict"),
            Unprocessable => (422, "Unprocessable", "unprocessable"),
            GeneralError => (500, "GeneralError", "general-error"),
            NotImplemented => (501, "NotImplemented", "not-implemented"),
            BadGateway => (502, "BadGateway", "bad-gateway"),
            Unavailable => (503, "Unavailable", "unavailable"),
            GatewayTimeout => (504, "GatewayTimeout", "gateway-timeout"),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.parts().0
    }

    pub fn name(&self) -> &'static str {
        self.parts().1
    }

    pub fn class_name(&self) -> &'static str {
        self.parts().2
    }

    /// Kind for an upstream status surfaced without a fallback. Unknown
    /// 4xx collapse to `BadRequest`, anything else to `GeneralError`.
    pub fn from_status(status: u16) -> Self {
        use ErrorKind::*;
        const KNOWN: [ErrorKind; 11] = [
            BadRequest,
            NotAuthenticated,
            Forbidden,
            NotFound,
            MethodNotAllowed,
            Conflict,
            Unprocessable,
            NotImplemented,
            BadGateway,
            Unavailable,
            GatewayTimeout,
        ];
        match KNOWN.into_iter().find(|k| k.status_code() == status) {
            Some(kind) => kind,
            None if (400..500).contains(&status) => BadRequest,
            None => GeneralError,
        }
    }
}

/// Structured error that can live inside `anyhow::Error`.
#[derive(Debug)]
pub struct RelayError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<Value>,
    /// Field-indexed messages for validation failures.
    pub errors: Option<Value>,
    /// Internal cause; never sent to clients.
    pub source: Option<AnyError>,
}

impl RelayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            errors: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    pub fn from_anyhow(err: &AnyError) -> Option<&RelayError> {
        err.downcast_ref::<RelayError>()
    }

    /// Copy without the internal `source`.
    pub fn sanitize_for_client(&self) -> RelayError {
        RelayError {
            source: None,
            data: self.data.clone(),
            errors: self.errors.clone(),
            message: self.message.clone(),
            ..*self
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });
        if let Some(data) = &self.data {
            body["data"] = data.clone();
        }
        if let Some(errors) = &self.errors {
            body["errors"] = errors.clone();
        }
        body
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }

    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAuthenticated, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }

    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadGateway, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, msg)
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Return early with a `RelayError` built by the named constructor.
#[macro_export]
macro_rules! bail_relay {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::RelayError::$ctor($msg).into_anyhow());
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::RelayError::$ctor(format!($fmt, $($arg)*)).into_anyhow());
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_errors_survive_anyhow() {
        let err = RelayError::conflict("busy").into_anyhow();
        assert_eq!(RelayError::from_anyhow(&err).map(RelayError::code), Some(409));
        assert!(RelayError::from_anyhow(&anyhow::anyhow!("boom")).is_none());
    }

    #[test]
    fn sanitize_drops_source_but_keeps_field_errors() {
        let err = RelayError::bad_request("Invalid credentials")
            .with_errors(json!({"client_id": ["is required"]}))
            .with_source(anyhow::anyhow!("secret detail"));

        let safe = err.sanitize_for_client();
        assert!(safe.source.is_none());
        assert_eq!(safe.to_json()["errors"]["client_id"][0], "is required");
        assert_eq!(safe.to_json()["className"], "bad-request");
    }

    #[test]
    fn upstream_statuses_map_to_kinds() {
        assert_eq!(ErrorKind::from_status(504), ErrorKind::GatewayTimeout);
        assert_eq!(ErrorKind::from_status(422).class_name(), "unprocessable");
        assert_eq!(ErrorKind::from_status(418), ErrorKind::BadRequest);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::GeneralError);
        assert_eq!(ErrorKind::from_status(599), ErrorKind::GeneralError);
    }

    fn bails() -> RelayResult<()> {
        bail_relay!(forbidden, "role {} is too low", "client");
    }

    #[test]
    fn bail_macro_formats_message() {
        let err = bails().unwrap_err();
        let relay = RelayError::from_anyhow(&err).unwrap();
        assert_eq!(relay.code(), 403);
        assert_eq!(relay.message, "role client is too low");
    }
}
