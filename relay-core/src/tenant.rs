//! Core multi-tenant types for Relay.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A tenant identifier (slug).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Trial,
    Starter,
    Professional,
    Enterprise,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
    pub primary_color: String,
    pub secondary_color: String,
    #[serde(default)]
    pub logo_ref: Option<String>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            primary_color: "#1f2937".to_string(),
            secondary_color: "#f9fafb".to_string(),
            logo_ref: None,
        }
    }
}

/// Tenant configuration as held by the tenant store.
///
/// Domains are either exact hosts (`acme.test`) or wildcard patterns
/// (`*.acme.test`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub domains: Vec<String>,
    pub display_name: String,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
    #[serde(default)]
    pub features: BTreeSet<String>,
    #[serde(default)]
    pub branding: Branding,
    #[serde(default = "default_onboarding_completed")]
    pub onboarding_completed: bool,
}

fn default_onboarding_completed() -> bool {
    true
}

impl TenantRecord {
    pub fn new(tenant_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            tenant_id: TenantId(tenant_id.into()),
            domains: Vec::new(),
            display_name: display_name.into(),
            subscription_tier: SubscriptionTier::default(),
            features: BTreeSet::new(),
            branding: Branding::default(),
            onboarding_completed: true,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domains.push(domain.into());
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    pub fn with_tier(mut self, tier: SubscriptionTier) -> Self {
        self.subscription_tier = tier;
        self
    }

    pub fn with_branding(mut self, branding: Branding) -> Self {
        self.branding = branding;
        self
    }

    pub fn with_onboarding_completed(mut self, completed: bool) -> Self {
        self.onboarding_completed = completed;
        self
    }
}

/// Context carried with every Relay operation.
///
/// Produced by the resolver and never mutated afterwards; handlers share it
/// behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub domains: Vec<String>,
    pub display_name: String,
    pub subscription_tier: SubscriptionTier,
    pub features: BTreeSet<String>,
    pub branding: Branding,
    pub onboarding_completed: bool,
    /// Set when the tenant store could not be reached and this is the
    /// default tenant standing in.
    #[serde(default)]
    pub degraded: bool,
}

impl TenantContext {
    /// Convenience constructor from a tenant id.
    pub fn new<S: Into<String>>(tenant: S) -> Self {
        let tenant = tenant.into();
        Self::from_record(&TenantRecord::new(tenant.clone(), tenant))
    }

    pub fn from_record(record: &TenantRecord) -> Self {
        Self {
            tenant_id: record.tenant_id.clone(),
            domains: record.domains.clone(),
            display_name: record.display_name.clone(),
            subscription_tier: record.subscription_tier,
            features: record.features.clone(),
            branding: record.branding.clone(),
            onboarding_completed: record.onboarding_completed,
            degraded: false,
        }
    }

    pub(crate) fn into_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}
