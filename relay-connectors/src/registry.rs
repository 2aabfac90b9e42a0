//! Connector Registry: per-tenant connector instances and their lifecycle.
//!
//! Every `(tenant, connector type)` pair owns one slot behind its own mutex.
//! The mutex is only held to read or flip state, never across an await; an
//! operation that has to wait on the secret store or the upstream marks the
//! slot busy first, so a second caller gets a conflict instead of a torn
//! transition.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use relay_core::{RelayApp, Source, TenantContext, TenantId};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::catalog::{ConnectorCatalog, ConnectorType};
use crate::error::ConnectorError;
use crate::secrets::{SecretRef, SecretStore};
use crate::status::ConnectorStatus;
use crate::validate::{validate_credentials, Credentials};

/// Capability used to verify fresh credentials for handshake connectors.
pub const HANDSHAKE_CAPABILITY: &str = "connectors.handshake";
/// Capability used to refresh a connected instance.
pub const SYNC_CAPABILITY: &str = "connectors.sync";

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug)]
struct Slot {
    status: ConnectorStatus,
    busy: Option<&'static str>,
    secret: Option<SecretRef>,
    last_sync_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            status: ConnectorStatus::Disconnected,
            busy: None,
            secret: None,
            last_sync_at: None,
            consecutive_failures: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

impl Slot {
    fn set_status(&mut self, status: ConnectorStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Public view of an instance. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorInstance {
    pub tenant_id: TenantId,
    pub connector_type_id: String,
    pub status: ConnectorStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub has_credentials: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub synced: bool,
    pub source: Source,
    pub instance: ConnectorInstance,
}

type SlotKey = (TenantId, String);

pub struct ConnectorRegistry {
    app: RelayApp,
    catalog: ConnectorCatalog,
    secrets: Arc<dyn SecretStore>,
    failure_threshold: u32,
    slots: DashMap<SlotKey, Arc<Mutex<Slot>>>,
}

impl ConnectorRegistry {
    pub fn new(app: RelayApp, catalog: ConnectorCatalog, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            app,
            catalog,
            secrets,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            slots: DashMap::new(),
        }
    }

    /// Consecutive sync failures that move an instance to `error`.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn list_types(&self) -> &[ConnectorType] {
        self.catalog.list()
    }

    pub fn connector_type(&self, id: &str) -> Result<&ConnectorType, ConnectorError> {
        self.catalog
            .get(id)
            .ok_or_else(|| ConnectorError::UnknownType(id.to_string()))
    }

    pub fn get_status(
        &self,
        tenant: &TenantId,
        type_id: &str,
    ) -> Result<ConnectorStatus, ConnectorError> {
        self.connector_type(type_id)?;
        let status = match self.existing(tenant, type_id) {
            Some(slot) => {
                let s = slot.lock();
                s.status
            }
            None => ConnectorStatus::default(),
        };
        Ok(status)
    }

    pub fn instance(
        &self,
        tenant: &TenantId,
        type_id: &str,
    ) -> Result<ConnectorInstance, ConnectorError> {
        self.connector_type(type_id)?;
        let instance = match self.existing(tenant, type_id) {
            Some(slot) => {
                let s = slot.lock();
                view(tenant, type_id, &s)
            }
            None => view(tenant, type_id, &Slot::default()),
        };
        Ok(instance)
    }

    /// Every instance the tenant has touched, ordered by connector type.
    pub fn instances(&self, tenant: &TenantId) -> Vec<ConnectorInstance> {
        let mut out: Vec<ConnectorInstance> = self
            .slots
            .iter()
            .filter(|e| &e.key().0 == tenant)
            .map(|e| view(tenant, &e.key().1, &e.value().lock()))
            .collect();
        out.sort_by(|a, b| a.connector_type_id.cmp(&b.connector_type_id));
        out
    }

    /// Validate and store credentials, then mark the instance connected.
    ///
    /// Nothing is written when validation fails. Handshake connectors are
    /// visibly `connecting` while the upstream checks the credentials.
    pub async fn connect(
        &self,
        tenant: &TenantContext,
        type_id: &str,
        form: &Map<String, Value>,
    ) -> Result<ConnectorInstance, ConnectorError> {
        let ty = self.connector_type(type_id)?;
        let credentials = validate_credentials(ty, form).map_err(|errors| {
            ConnectorError::Validation {
                connector: ty.id.clone(),
                errors,
            }
        })?;

        let tenant_id = &tenant.tenant_id;
        let slot = self.slot(tenant_id, type_id);
        {
            let mut s = slot.lock();
            claim(&mut s, type_id, "connect", ConnectorStatus::Connecting)?;
            s.busy = Some("connect");
            if ty.handshake {
                s.set_status(ConnectorStatus::Connecting);
                info!(tenant_id = %tenant_id, connector = type_id, "connector connecting");
            }
        }

        let secret = match self.secrets.put(tenant_id, type_id, &credentials).await {
            Ok(secret) => secret,
            Err(err) => {
                error!(tenant_id = %tenant_id, connector = type_id, error = %err, "secret store write failed");
                let stale = self.abort_connect(&slot, ty.handshake, None);
                self.forget(stale).await;
                return Err(ConnectorError::Secrets(err));
            }
        };

        if ty.handshake {
            if let Err(err) = self.handshake(tenant, ty, &credentials).await {
                warn!(tenant_id = %tenant_id, connector = type_id, error = %err, "connector handshake failed");
                let stale = self.abort_connect(&slot, true, Some(err.to_string()));
                self.forget(Some(secret)).await;
                self.forget(stale).await;
                return Err(err);
            }
        }

        let (instance, replaced) = {
            let mut s = slot.lock();
            let replaced = s.secret.replace(secret);
            s.busy = None;
            s.consecutive_failures = 0;
            s.last_error = None;
            s.set_status(ConnectorStatus::Connected);
            (view(tenant_id, type_id, &s), replaced)
        };
        self.forget(replaced).await;

        info!(tenant_id = %tenant_id, connector = type_id, "connector connected");
        Ok(instance)
    }

    /// Drop the credentials and return to `disconnected`. `last_sync_at`
    /// survives.
    pub async fn disconnect(
        &self,
        tenant: &TenantId,
        type_id: &str,
    ) -> Result<ConnectorInstance, ConnectorError> {
        self.connector_type(type_id)?;
        let slot = self.slot(tenant, type_id);

        let (instance, secret) = {
            let mut s = slot.lock();
            claim(&mut s, type_id, "disconnect", ConnectorStatus::Disconnected)?;
            let secret = s.secret.take();
            s.consecutive_failures = 0;
            s.last_error = None;
            s.set_status(ConnectorStatus::Disconnected);
            (view(tenant, type_id, &s), secret)
        };
        self.forget(secret).await;

        info!(tenant_id = %tenant, connector = type_id, "connector disconnected");
        Ok(instance)
    }

    /// Refresh a connected instance through the proxy. Fallback data does
    /// not count as a sync; enough consecutive misses move the instance to
    /// `error`.
    pub async fn sync(
        &self,
        tenant: &TenantContext,
        type_id: &str,
    ) -> Result<SyncReport, ConnectorError> {
        self.connector_type(type_id)?;
        let tenant_id = &tenant.tenant_id;
        let slot = self.slot(tenant_id, type_id);

        {
            let mut s = slot.lock();
            if let Some(action) = s.busy {
                return Err(ConnectorError::Busy {
                    connector: type_id.to_string(),
                    action,
                    status: s.status,
                });
            }
            if s.status != ConnectorStatus::Connected {
                return Err(ConnectorError::State {
                    connector: type_id.to_string(),
                    action: "sync",
                    status: s.status,
                });
            }
            s.busy = Some("sync");
        }

        let outcome = match self.app.capability(SYNC_CAPABILITY) {
            Ok(def) => {
                let req = def.request().with_path_param("connector", type_id);
                let result = self.app.execute(&req, tenant).await;
                let synced = result.success && result.source == Source::Upstream;
                let reason = (!synced).then(|| {
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("sync answered from {}", result.source))
                });
                (result.source, reason)
            }
            Err(err) => (Source::Error, Some(err.message)),
        };

        let (source, reason) = outcome;
        let instance = {
            let mut s = slot.lock();
            s.busy = None;
            match &reason {
                None => {
                    s.last_sync_at = Some(Utc::now());
                    s.consecutive_failures = 0;
                    s.last_error = None;
                }
                Some(reason) => {
                    s.consecutive_failures += 1;
                    s.last_error = Some(reason.clone());
                    warn!(
                        tenant_id = %tenant_id,
                        connector = type_id,
                        failures = s.consecutive_failures,
                        reason = %reason,
                        "connector sync failed"
                    );
                    if s.consecutive_failures >= self.failure_threshold {
                        s.set_status(ConnectorStatus::Error);
                        warn!(tenant_id = %tenant_id, connector = type_id, "connector moved to error");
                    }
                }
            }
            view(tenant_id, type_id, &s)
        };

        Ok(SyncReport {
            synced: reason.is_none(),
            source,
            instance,
        })
    }

    /// Decrypted credentials of a connected instance, for adapters that
    /// must talk to the provider directly.
    pub async fn credentials(
        &self,
        tenant: &TenantId,
        type_id: &str,
    ) -> Result<Option<Credentials>, ConnectorError> {
        self.connector_type(type_id)?;
        let secret = match self.existing(tenant, type_id) {
            Some(slot) => {
                let s = slot.lock();
                s.secret.clone()
            }
            None => None,
        };
        match secret {
            Some(secret) => self
                .secrets
                .get(tenant, type_id, &secret)
                .await
                .map_err(ConnectorError::Secrets),
            None => Ok(None),
        }
    }

    async fn handshake(
        &self,
        tenant: &TenantContext,
        ty: &ConnectorType,
        credentials: &Credentials,
    ) -> Result<(), ConnectorError> {
        let def = self.app.capability(HANDSHAKE_CAPABILITY).map_err(|e| {
            ConnectorError::Unreachable {
                connector: ty.id.clone(),
                reason: e.message,
            }
        })?;

        let req = def
            .request()
            .with_path_param("connector", ty.id.as_str())
            .with_body(json!({ "connector": ty.id, "credentials": credentials }));
        let result = self.app.execute(&req, tenant).await;

        match result.source {
            Source::Upstream if result.success => Ok(()),
            Source::Error if (400..500).contains(&result.http_status) => {
                let mut errors = relay_core::SchemaErrors::default();
                errors.push_schema(
                    result
                        .error
                        .unwrap_or_else(|| "credentials were rejected".to_string()),
                );
                Err(ConnectorError::Rejected {
                    connector: ty.id.clone(),
                    errors,
                })
            }
            _ => Err(ConnectorError::Unreachable {
                connector: ty.id.clone(),
                reason: result
                    .error
                    .unwrap_or_else(|| format!("handshake answered from {}", result.source)),
            }),
        }
    }

    /// Roll back a connect claim. Returns the previous secret when the
    /// instance ends up `disconnected`.
    fn abort_connect(
        &self,
        slot: &Mutex<Slot>,
        handshake: bool,
        last_error: Option<String>,
    ) -> Option<SecretRef> {
        let mut s = slot.lock();
        s.busy = None;
        if !handshake {
            return None;
        }
        s.last_error = last_error;
        s.consecutive_failures = 0;
        s.set_status(ConnectorStatus::Disconnected);
        s.secret.take()
    }

    async fn forget(&self, secret: Option<SecretRef>) {
        if let Some(secret) = secret {
            if let Err(err) = self.secrets.delete(&secret).await {
                error!(secret = secret.as_str(), error = %err, "secret store delete failed");
            }
        }
    }

    fn slot(&self, tenant: &TenantId, type_id: &str) -> Arc<Mutex<Slot>> {
        self.slots
            .entry((tenant.clone(), type_id.to_string()))
            .or_default()
            .clone()
    }

    fn existing(&self, tenant: &TenantId, type_id: &str) -> Option<Arc<Mutex<Slot>>> {
        self.slots
            .get(&(tenant.clone(), type_id.to_string()))
            .map(|e| e.value().clone())
    }
}

fn claim(
    s: &mut Slot,
    type_id: &str,
    action: &'static str,
    to: ConnectorStatus,
) -> Result<(), ConnectorError> {
    if let Some(busy) = s.busy {
        return Err(ConnectorError::Busy {
            connector: type_id.to_string(),
            action: busy,
            status: s.status,
        });
    }
    if !s.status.can_transition(to) {
        return Err(ConnectorError::State {
            connector: type_id.to_string(),
            action,
            status: s.status,
        });
    }
    Ok(())
}

fn view(tenant: &TenantId, type_id: &str, s: &Slot) -> ConnectorInstance {
    ConnectorInstance {
        tenant_id: tenant.clone(),
        connector_type_id: type_id.to_string(),
        status: s.status,
        last_sync_at: s.last_sync_at,
        consecutive_failures: s.consecutive_failures,
        has_credentials: s.secret.is_some(),
        last_error: s.last_error.clone(),
        updated_at: s.updated_at,
    }
}
