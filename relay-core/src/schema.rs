//! Structural response shapes and field-indexed error collection.
//!
//! A capability declares the shape of its upstream success payload; the
//! fallback registered for it must satisfy the same shape, so callers never
//! special-case degraded data structurally.

use serde_json::{json, Map, Value};

use crate::errors::RelayError;

/// Field-indexed error messages, keyed by dotted path (`items[0].id`).
#[derive(Debug, Default, Clone)]
pub struct SchemaErrors {
    map: Map<String, Value>,
}

impl SchemaErrors {
    pub fn push_schema(&mut self, msg: impl Into<String>) {
        Self::push_to(&mut self.map, "_schema", msg);
    }

    pub fn push_field(&mut self, field: &str, msg: impl Into<String>) {
        Self::push_to(&mut self.map, field, msg);
    }

    fn push_to(map: &mut Map<String, Value>, key: &str, msg: impl Into<String>) {
        let msg = Value::String(msg.into());
        match map.get_mut(key) {
            Some(Value::Array(arr)) => arr.push(msg),
            _ => {
                map.insert(key.to_string(), Value::Array(vec![msg]));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(|k| k.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.map.contains_key(field)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.map.clone())
    }

    pub fn into_bad_request(self, message: &str) -> RelayError {
        RelayError::bad_request(message).with_errors(Value::Object(self.map))
    }

    pub fn into_bad_request_anyhow(self, message: &str) -> anyhow::Error {
        self.into_bad_request(message).into_anyhow()
    }
}

pub fn schema_error(message: &str, msg: impl Into<String>) -> anyhow::Error {
    RelayError::bad_request(message)
        .with_errors(json!({"_schema": [msg.into()]}))
        .into_anyhow()
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn join_index(prefix: &str, idx: usize) -> String {
    format!("{prefix}[{idx}]")
}

/// A small structural schema for JSON payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Any,
    String,
    Number,
    Bool,
    Nullable(Box<Shape>),
    Array(Box<Shape>),
    /// Object with required fields. Extra fields are allowed.
    Object(Vec<(String, Shape)>),
}

impl Shape {
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Shape)>,
        K: Into<String>,
    {
        Shape::Object(fields.into_iter().map(|(k, s)| (k.into(), s)).collect())
    }

    pub fn array_of(item: Shape) -> Self {
        Shape::Array(Box::new(item))
    }

    pub fn nullable(inner: Shape) -> Self {
        Shape::Nullable(Box::new(inner))
    }

    /// Check `value` against this shape, collecting every mismatch.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaErrors> {
        let mut errors = SchemaErrors::default();
        self.check(value, "", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check(&self, value: &Value, path: &str, out: &mut SchemaErrors) {
        let key = if path.is_empty() { "_schema" } else { path };
        match (self, value) {
            (Shape::Any, _) => {}
            (Shape::Nullable(_), Value::Null) => {}
            (Shape::Nullable(inner), v) => inner.check(v, path, out),
            (Shape::String, Value::String(_)) => {}
            (Shape::Number, Value::Number(_)) => {}
            (Shape::Bool, Value::Bool(_)) => {}
            (Shape::Array(item), Value::Array(items)) => {
                for (idx, v) in items.iter().enumerate() {
                    item.check(v, &join_index(path, idx), out);
                }
            }
            (Shape::Object(fields), Value::Object(map)) => {
                for (name, shape) in fields {
                    let next = join_path(path, name);
                    match map.get(name) {
                        Some(v) => shape.check(v, &next, out),
                        None if matches!(shape, Shape::Nullable(_) | Shape::Any) => {}
                        None => out.push_field(&next, "is required"),
                    }
                }
            }
            (expected, _) => out.push_field(key, format!("expected {}", expected.type_name())),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Shape::Any => "any",
            Shape::String => "string",
            Shape::Number => "number",
            Shape::Bool => "boolean",
            Shape::Nullable(inner) => inner.type_name(),
            Shape::Array(_) => "array",
            Shape::Object(_) => "object",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_shape() -> Shape {
        Shape::object([
            ("total", Shape::Number),
            (
                "items",
                Shape::array_of(Shape::object([("id", Shape::String), ("clicks", Shape::Number)])),
            ),
            ("note", Shape::nullable(Shape::String)),
        ])
    }

    #[test]
    fn valid_payload_passes() {
        let v = json!({"total": 3, "items": [{"id": "a", "clicks": 3}], "extra": true});
        assert!(metrics_shape().validate(&v).is_ok());
    }

    #[test]
    fn nested_errors_are_flattened_with_paths() {
        let v = json!({"total": "3", "items": [{"id": 1, "clicks": 3}, {"clicks": 1}]});
        let errs = metrics_shape().validate(&v).unwrap_err();

        assert!(errs.contains("total"));
        assert!(errs.contains("items[0].id"));
        assert!(errs.contains("items[1].id"));
        assert!(!errs.contains("note"));
        assert_eq!(errs.to_value()["items[1].id"][0], "is required");
    }

    #[test]
    fn root_mismatch_is_reported_under_schema_key() {
        let errs = Shape::array_of(Shape::Any).validate(&json!({})).unwrap_err();
        assert_eq!(errs.to_value()["_schema"][0], "expected array");
    }

    #[test]
    fn into_bad_request_carries_field_errors() {
        let mut errs = SchemaErrors::default();
        errs.push_field("client_id", "is required");
        let err = errs.into_bad_request("Invalid credentials");
        assert_eq!(err.code(), 400);
        assert_eq!(err.errors.unwrap()["client_id"][0], "is required");
    }
}
