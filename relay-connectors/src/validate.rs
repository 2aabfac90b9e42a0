//! Credential form validation against a connector's auth schema.

use std::collections::BTreeMap;

use relay_core::SchemaErrors;
use serde_json::{Map, Value};
use validator::{ValidateEmail, ValidateUrl};

use crate::catalog::{ConnectorType, FieldFormat};

/// Field name to submitted value, trimmed.
pub type Credentials = BTreeMap<String, String>;

fn format_message(format: FieldFormat) -> &'static str {
    match format {
        FieldFormat::Email => "must be a valid email",
        FieldFormat::Url => "must be a valid URL",
        FieldFormat::Digits => "must contain digits only",
        FieldFormat::Uuid => "must be a valid UUID",
    }
}

fn matches_format(value: &str, format: FieldFormat) -> bool {
    match format {
        FieldFormat::Email => value.validate_email(),
        FieldFormat::Url => value.validate_url(),
        FieldFormat::Digits => value.bytes().all(|b| b.is_ascii_digit()),
        FieldFormat::Uuid => uuid::Uuid::parse_str(value).is_ok(),
    }
}

/// Check `input` against `connector.auth_schema`, reporting every failing
/// field at once. Optional fields left blank are dropped from the result.
pub fn validate_credentials(
    connector: &ConnectorType,
    input: &Map<String, Value>,
) -> Result<Credentials, SchemaErrors> {
    let mut errors = SchemaErrors::default();
    let mut out = Credentials::new();

    for key in input.keys() {
        if !connector.auth_schema.contains_key(key) {
            errors.push_field(key, "is not a recognized field");
        }
    }

    for (name, spec) in &connector.auth_schema {
        let value = match input.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim()),
            Some(_) => {
                errors.push_field(name, "must be a string");
                continue;
            }
        };

        match value.filter(|v| !v.is_empty()) {
            None if spec.required => errors.push_field(name, "is required"),
            None => {}
            Some(v) => {
                if let Some(format) = spec.format {
                    if !matches_format(v, format) {
                        errors.push_field(name, format_message(format));
                        continue;
                    }
                }
                out.insert(name.clone(), v.to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}
