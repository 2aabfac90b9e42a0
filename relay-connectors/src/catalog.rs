//! Built-in connector types.
//!
//! A connector type is pure data: the credential form it needs and how its
//! health is checked. The catalog is fixed at startup.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Shown in clear text.
    Text,
    /// Masked in forms, never echoed back.
    Secret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    Email,
    Url,
    Digits,
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FieldFormat>,
    pub help: String,
}

impl FieldSpec {
    pub fn text(help: impl Into<String>) -> Self {
        Self {
            field_type: FieldType::Text,
            required: true,
            format: None,
            help: help.into(),
        }
    }

    pub fn secret(help: impl Into<String>) -> Self {
        Self {
            field_type: FieldType::Secret,
            ..Self::text(help)
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorCategory {
    Advertising,
    Crm,
    Marketing,
    Payments,
    Analytics,
    Productivity,
    Storage,
    Messaging,
    Support,
    Accounting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorType {
    pub id: String,
    pub name: String,
    pub category: ConnectorCategory,
    pub auth_schema: BTreeMap<String, FieldSpec>,
    /// Credentials are verified upstream before the instance is connected.
    pub handshake: bool,
}

impl ConnectorType {
    pub fn new(id: &str, name: &str, category: ConnectorCategory) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category,
            auth_schema: BTreeMap::new(),
            handshake: false,
        }
    }

    pub fn field(mut self, name: &str, spec: FieldSpec) -> Self {
        self.auth_schema.insert(name.to_string(), spec);
        self
    }

    pub fn with_handshake(mut self) -> Self {
        self.handshake = true;
        self
    }
}

/// Immutable set of connector types, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ConnectorCatalog {
    types: Vec<ConnectorType>,
}

impl ConnectorCatalog {
    pub fn new(types: Vec<ConnectorType>) -> Self {
        Self { types }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_types())
    }

    pub fn get(&self, id: &str) -> Option<&ConnectorType> {
        self.types.iter().find(|t| t.id == id)
    }

    pub fn list(&self) -> &[ConnectorType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn builtin_types() -> Vec<ConnectorType> {
    use ConnectorCategory::*;
    use FieldFormat::*;

    vec![
        ConnectorType::new("ads_platform", "Ads Platform", Advertising)
            .field("client_id", FieldSpec::text("OAuth client id from the developer console"))
            .field("client_secret", FieldSpec::secret("OAuth client secret"))
            .field(
                "account_id",
                FieldSpec::text("Ad account number, digits only").optional().format(Digits),
            )
            .with_handshake(),
        ConnectorType::new("search_ads", "Search Ads", Advertising)
            .field("developer_token", FieldSpec::secret("Developer token"))
            .field("customer_id", FieldSpec::text("Customer id without dashes").format(Digits))
            .field("refresh_token", FieldSpec::secret("Offline refresh token"))
            .with_handshake(),
        ConnectorType::new("social_ads", "Social Ads", Advertising)
            .field("app_id", FieldSpec::text("App id").format(Digits))
            .field("access_token", FieldSpec::secret("Long-lived system user token")),
        ConnectorType::new("crm", "CRM", Crm)
            .field("instance_url", FieldSpec::text("Base URL of your CRM instance").format(Url))
            .field("api_key", FieldSpec::secret("API key with read access to contacts"))
            .with_handshake(),
        ConnectorType::new("email_marketing", "Email Marketing", Marketing)
            .field("api_key", FieldSpec::secret("API key"))
            .field("sender_email", FieldSpec::text("Verified sender address").format(Email))
            .field("list_id", FieldSpec::text("Default audience list").optional()),
        ConnectorType::new("payment_processor", "Payment Processor", Payments)
            .field("secret_key", FieldSpec::secret("Restricted secret key"))
            .field("webhook_secret", FieldSpec::secret("Webhook signing secret").optional())
            .with_handshake(),
        ConnectorType::new("web_analytics", "Web Analytics", Analytics)
            .field("measurement_id", FieldSpec::text("Measurement id of the property"))
            .field("api_secret", FieldSpec::secret("Measurement protocol API secret")),
        ConnectorType::new("calendar", "Calendar", Productivity)
            .field("client_id", FieldSpec::text("OAuth client id"))
            .field("client_secret", FieldSpec::secret("OAuth client secret"))
            .field("calendar_email", FieldSpec::text("Calendar owner address").format(Email)),
        ConnectorType::new("object_storage", "Object Storage", Storage)
            .field("endpoint", FieldSpec::text("S3-compatible endpoint").format(Url))
            .field("bucket", FieldSpec::text("Bucket name"))
            .field("access_key_id", FieldSpec::text("Access key id"))
            .field("secret_access_key", FieldSpec::secret("Secret access key")),
        ConnectorType::new("sms", "SMS Messaging", Messaging)
            .field("account_sid", FieldSpec::text("Account SID"))
            .field("auth_token", FieldSpec::secret("Auth token"))
            .field("from_number", FieldSpec::text("Sending number, digits only").format(Digits)),
        ConnectorType::new("helpdesk", "Helpdesk", Support)
            .field("subdomain_url", FieldSpec::text("Helpdesk URL").format(Url))
            .field("agent_email", FieldSpec::text("Agent address owning the token").format(Email))
            .field("api_token", FieldSpec::secret("API token")),
        ConnectorType::new("accounting", "Accounting", Accounting)
            .field("client_id", FieldSpec::text("OAuth client id"))
            .field("client_secret", FieldSpec::secret("OAuth client secret"))
            .field("company_id", FieldSpec::text("Company id").format(Uuid))
            .with_handshake(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_sized_and_unique() {
        let catalog = ConnectorCatalog::builtin();
        assert!((10..=15).contains(&catalog.len()));

        let mut ids: Vec<_> = catalog.list().iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn auth_schema_serializes_with_type_key() {
        let ads = ConnectorCatalog::builtin().get("ads_platform").cloned().unwrap();
        let v = serde_json::to_value(&ads).unwrap();
        assert_eq!(v["auth_schema"]["client_secret"]["type"], "secret");
        assert_eq!(v["auth_schema"]["client_id"]["required"], true);
        assert_eq!(v["auth_schema"]["account_id"]["format"], "digits");
        assert!(v["auth_schema"]["client_id"].get("format").is_none());
    }
}
