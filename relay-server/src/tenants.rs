//! Tenant records: built-in seed data or a JSON file (`tenants.file`).

use std::collections::BTreeSet;
use std::path::Path;

use relay_core::{Branding, MemoryTenantStore, SchemaErrors, SubscriptionTier, TenantRecord};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct TenantFile {
    #[validate(nested)]
    pub tenants: Vec<TenantSeed>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TenantSeed {
    #[validate(length(min = 1, max = 64))]
    pub tenant_id: String,
    #[validate(length(min = 1))]
    pub display_name: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
    #[serde(default)]
    pub features: BTreeSet<String>,
    #[serde(default)]
    #[validate(nested)]
    pub branding: BrandingSeed,
    #[serde(default = "default_true")]
    pub onboarding_completed: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct BrandingSeed {
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    #[validate(url(message = "must be a valid URL"))]
    pub logo_ref: Option<String>,
}

impl From<BrandingSeed> for Branding {
    fn from(seed: BrandingSeed) -> Self {
        let base = Branding::default();
        Branding {
            primary_color: seed.primary_color.unwrap_or(base.primary_color),
            secondary_color: seed.secondary_color.unwrap_or(base.secondary_color),
            logo_ref: seed.logo_ref,
        }
    }
}

fn default_true() -> bool {
    true
}

impl From<TenantSeed> for TenantRecord {
    fn from(seed: TenantSeed) -> Self {
        let mut record = TenantRecord::new(seed.tenant_id, seed.display_name)
            .with_features(seed.features)
            .with_tier(seed.subscription_tier)
            .with_branding(seed.branding.into())
            .with_onboarding_completed(seed.onboarding_completed);
        for domain in seed.domains {
            record = record.with_domain(domain);
        }
        record
    }
}

fn friendly_message(code: &str) -> Option<&'static str> {
    match code {
        "required" => Some("is required"),
        "length" => Some("has invalid length"),
        "url" => Some("must be a valid URL"),
        _ => None,
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn push_validation_errors(out: &mut SchemaErrors, prefix: &str, errs: &validator::ValidationErrors) {
    for (field, kind) in errs.errors() {
        match kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                let key = join_path(prefix, field);
                for e in field_errors {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .or_else(|| friendly_message(&e.code).map(|m| m.to_string()))
                        .unwrap_or_else(|| e.code.to_string());
                    out.push_field(&key, msg);
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => {
                push_validation_errors(out, &join_path(prefix, field), nested.as_ref());
            }
            validator::ValidationErrorsKind::List(list) => {
                let base = join_path(prefix, field);
                for (idx, nested) in list {
                    push_validation_errors(out, &format!("{base}[{idx}]"), nested.as_ref());
                }
            }
        }
    }
}

/// Parse and validate a tenant file. Field errors carry their path, e.g.
/// `tenants[1].display_name`.
pub fn parse(raw: &str) -> anyhow::Result<Vec<TenantRecord>> {
    let file: TenantFile = serde_json::from_str(raw).map_err(|e| {
        let mut errors = SchemaErrors::default();
        errors.push_schema(e.to_string());
        errors.into_bad_request_anyhow("Tenant file is not valid JSON")
    })?;
    file.validate().map_err(|e| {
        let mut errors = SchemaErrors::default();
        push_validation_errors(&mut errors, "", &e);
        errors.into_bad_request_anyhow("Tenant file failed validation")
    })?;
    Ok(file.tenants.into_iter().map(TenantRecord::from).collect())
}

pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Vec<TenantRecord>> {
    let raw = tokio::fs::read_to_string(path.as_ref()).await?;
    parse(&raw)
}

/// Demo tenants for local runs.
pub fn seed() -> Vec<TenantRecord> {
    vec![
        TenantRecord::new("acme", "Acme Marketing")
            .with_domain("acme.localhost")
            .with_domain("*.acme.localhost")
            .with_tier(SubscriptionTier::Professional)
            .with_features(["dashboard", "campaigns", "connectors"]),
        TenantRecord::new("globex", "Globex Games")
            .with_domain("globex.localhost")
            .with_features(["dashboard"])
            .with_onboarding_completed(false),
    ]
}

pub async fn store(file: Option<&str>) -> anyhow::Result<MemoryTenantStore> {
    let records = match file {
        Some(path) => {
            let records = load(path).await?;
            tracing::info!(path, count = records.len(), "loaded tenants");
            records
        }
        None => seed(),
    };
    Ok(MemoryTenantStore::with_records(records))
}
