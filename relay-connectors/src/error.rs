use relay_core::{RelayError, SchemaErrors};
use thiserror::Error;

use crate::status::ConnectorStatus;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Unknown connector type: {0}")]
    UnknownType(String),

    #[error("Invalid credentials for {connector}")]
    Validation {
        connector: String,
        errors: SchemaErrors,
    },

    #[error("Cannot {action} {connector} while it is {status}")]
    State {
        connector: String,
        action: &'static str,
        status: ConnectorStatus,
    },

    #[error("{connector} is busy with another {action}")]
    Busy {
        connector: String,
        action: &'static str,
        status: ConnectorStatus,
    },

    #[error("{connector} rejected the credentials")]
    Rejected {
        connector: String,
        errors: SchemaErrors,
    },

    #[error("{connector} could not be reached: {reason}")]
    Unreachable { connector: String, reason: String },

    #[error("secret store failure")]
    Secrets(#[source] anyhow::Error),
}

impl ConnectorError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConnectorError::State { .. } | ConnectorError::Busy { .. })
    }
}

impl From<ConnectorError> for RelayError {
    fn from(err: ConnectorError) -> Self {
        let message = err.to_string();
        match err {
            ConnectorError::UnknownType(_) => RelayError::not_found(message),
            ConnectorError::Validation { errors, .. } | ConnectorError::Rejected { errors, .. } => {
                errors.into_bad_request(&message)
            }
            ConnectorError::State { status, .. } | ConnectorError::Busy { status, .. } => {
                RelayError::conflict(message).with_data(serde_json::json!({ "status": status }))
            }
            ConnectorError::Unreachable { .. } => RelayError::bad_gateway(message),
            ConnectorError::Secrets(source) => {
                RelayError::unavailable("Credential storage is unavailable").with_source(source)
            }
        }
    }
}
