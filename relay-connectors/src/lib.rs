//! relay-connectors: tenant-owned connections to external accounts.
//!
//! ```text
//! ConnectorCatalog  (what can be connected, credential forms)
//! ConnectorRegistry (per-tenant instances, state machine)
//!        |
//!        +-- SecretStore (encrypted credentials)
//!        +-- RelayApp    (handshake + sync through the proxy)
//! ```

pub mod catalog;
pub mod error;
pub mod registry;
pub mod secrets;
pub mod status;
pub mod validate;

pub use catalog::{ConnectorCatalog, ConnectorCategory, ConnectorType, FieldFormat, FieldSpec, FieldType};
pub use error::ConnectorError;
pub use registry::{
    ConnectorInstance, ConnectorRegistry, SyncReport, DEFAULT_FAILURE_THRESHOLD,
    HANDSHAKE_CAPABILITY, SYNC_CAPABILITY,
};
pub use secrets::{EncryptedMemorySecretStore, SecretRef, SecretStore};
pub use status::ConnectorStatus;
pub use validate::{validate_credentials, Credentials};
