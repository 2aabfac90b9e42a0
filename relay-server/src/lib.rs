pub mod capabilities;
pub mod config;
pub mod tenants;
pub mod upstream;

use std::sync::Arc;

use relay_auth::{Authenticator, JwtOptions};
use relay_axum::{axum, RelayAxum, RelayAxumState};
use relay_connectors::{
    ConnectorCatalog, ConnectorRegistry, EncryptedMemorySecretStore, DEFAULT_FAILURE_THRESHOLD,
};
use relay_core::{RelayApp, RelayConfig, TenantStore, Upstream};

pub use upstream::HttpUpstream;

/// Build the server from configuration: tenants from `tenants.file` or the
/// seed, the Gateway at `gateway.base_url`.
pub async fn build(cfg: RelayConfig) -> anyhow::Result<RelayAxum> {
    let snapshot = cfg.snapshot();
    let store = tenants::store(snapshot.get("tenants.file")).await?;
    let base_url = snapshot
        .get("gateway.base_url")
        .ok_or_else(|| anyhow::anyhow!("Missing 'gateway.base_url'"))?;
    let upstream = HttpUpstream::new(base_url)?;
    tracing::info!(gateway = upstream.base_url(), "upstream configured");

    build_with(cfg, Arc::new(store), Arc::new(upstream))
}

pub fn build_with(
    cfg: RelayConfig,
    store: Arc<dyn TenantStore>,
    upstream: Arc<dyn Upstream>,
) -> anyhow::Result<RelayAxum> {
    let snapshot = cfg.snapshot();

    let jwt = JwtOptions::from_config(&snapshot).map_err(anyhow::Error::msg)?;
    let secrets = match snapshot.get("secrets.key") {
        Some(key) => EncryptedMemorySecretStore::from_base64_key(key)?,
        None => {
            tracing::warn!("secrets.key is not set, connector credentials will not survive a restart");
            EncryptedMemorySecretStore::ephemeral()
        }
    };

    let app = RelayApp::builder(store, upstream)
        .config(cfg)
        .capabilities(capabilities::registry())
        .fallbacks(capabilities::fallbacks())
        .build()?;
    tracing::info!(
        capabilities = app.registry().len(),
        mode = %app.executor().mode(),
        "relay configured"
    );

    let threshold = snapshot
        .get_u32("connectors.failure_threshold")
        .unwrap_or(DEFAULT_FAILURE_THRESHOLD);
    let connectors = ConnectorRegistry::new(app.clone(), ConnectorCatalog::builtin(), Arc::new(secrets))
        .failure_threshold(threshold);

    let ax = axum(RelayAxumState::new(app, Authenticator::new(jwt), connectors))
        .service("/health", || async { "ok" });
    Ok(ax)
}
