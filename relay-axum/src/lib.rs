//! relay-axum: Axum adapter for the Relay gateway.
//!
//! Turns a [`relay_core::RelayApp`] plus an authenticator and a connector
//! registry into an axum `Router`.

pub mod app;
pub mod params;
pub mod routes;
pub mod state;
mod error;
pub use error::RelayAxumError;
pub use params::RequestContext;
pub use state::RelayAxumState;

pub use app::{axum, RelayAxum};
