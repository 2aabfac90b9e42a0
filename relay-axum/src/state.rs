use std::sync::Arc;

use relay_auth::Authenticator;
use relay_connectors::ConnectorRegistry;
use relay_core::RelayApp;

/// Shared handler state. Cheap to clone; everything sits behind an `Arc`.
#[derive(Clone)]
pub struct RelayAxumState {
    pub app: RelayApp,
    pub auth: Arc<Authenticator>,
    pub connectors: Arc<ConnectorRegistry>,
}

impl RelayAxumState {
    pub fn new(app: RelayApp, auth: Authenticator, connectors: ConnectorRegistry) -> Self {
        Self {
            app,
            auth: Arc::new(auth),
            connectors: Arc::new(connectors),
        }
    }
}
