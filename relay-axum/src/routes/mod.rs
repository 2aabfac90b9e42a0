pub mod capabilities;
pub mod connectors;
pub mod tenants;

use axum::Router;

use crate::RelayAxumState;

/// Every Relay route, still waiting for its state.
pub fn router() -> Router<RelayAxumState> {
    Router::new()
        .merge(capabilities::router())
        .merge(connectors::router())
        .merge(tenants::router())
}
