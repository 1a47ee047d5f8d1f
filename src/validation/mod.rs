//! Schema-driven validation.
//!
//! [`SchemaValidator`] wraps a compiled `jsonschema` validator together with
//! the source schema document. Validators are compiled once at assembly time
//! and shared by reference across all in-flight requests; they are never
//! mutated after construction. Custom formats (currently `duration`) are
//! registered on every compiled schema.
//!
//! Validation fails fast: the first violation is reported as a
//! [`SchemaViolation`] carrying a field path in the `root.key[i]` notation
//! that is part of the external error contract.

pub mod formats;
pub mod schemas;

use serde_json::Value;

use crate::error::{ApiError, ConstructionError};

/// A declarative JSON schema compiled for repeated validation.
pub struct SchemaValidator {
    schema: Value,
    compiled: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile a schema document, registering the custom format checkers.
    pub fn compile(schema: &Value) -> Result<Self, ConstructionError> {
        let compiled = jsonschema::options()
            .should_validate_formats(true)
            .with_format("duration", formats::is_duration)
            .build(schema)
            .map_err(|err| ConstructionError::InvalidSchema(err.to_string()))?;
        Ok(Self {
            schema: schema.clone(),
            compiled,
        })
    }

    /// The source schema document.
    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate a value, reporting the first violation.
    pub fn validate(&self, instance: &Value) -> Result<(), SchemaViolation> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(err) => {
                let pointer = err.instance_path().to_string();
                Err(SchemaViolation {
                    path: field_path(instance, &pointer),
                    message: err.to_string(),
                })
            }
        }
    }

    /// Whether a value satisfies the schema, without error details.
    #[must_use]
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.compiled.is_valid(instance)
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .finish()
    }
}

/// A single schema violation: the offending field path plus the violation
/// message reported by the schema engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Field path in `root.key[i]` notation.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl From<SchemaViolation> for ApiError {
    fn from(violation: SchemaViolation) -> Self {
        ApiError::new(400)
            .with_message(violation.message)
            .with_detail("path", Value::String(violation.path))
    }
}

/// Translate a JSON pointer into the `root.key[i]` path notation.
///
/// Array indices render as `[n]`, object keys as `.key`, the whole path is
/// prefixed with `root`. The instance is walked alongside the pointer so a
/// numeric object key is still rendered as a key, not an index.
fn field_path(instance: &Value, pointer: &str) -> String {
    let mut path = String::from("root");
    let mut current = Some(instance);
    for raw in pointer.split('/').skip(1) {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        match current {
            Some(Value::Array(items)) => {
                path.push('[');
                path.push_str(&segment);
                path.push(']');
                current = segment.parse::<usize>().ok().and_then(|i| items.get(i));
            }
            other => {
                path.push('.');
                path.push_str(&segment);
                current = other.and_then(|v| v.get(&segment));
            }
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_violation_path_for_object_key() {
        let validator = SchemaValidator::compile(&json!({
            "type": "object",
            "properties": {"x": {"type": "integer"}}
        }))
        .unwrap();
        let violation = validator.validate(&json!({"x": "s"})).unwrap_err();
        assert_eq!(violation.path, "root.x");
    }

    #[test]
    fn test_violation_path_for_nested_array_item() {
        let validator = SchemaValidator::compile(&json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name"]
                    }
                }
            }
        }))
        .unwrap();
        let instance = json!({"items": [{"name": "a"}, {"name": "b"}, {"name": 3}]});
        let violation = validator.validate(&instance).unwrap_err();
        assert_eq!(violation.path, "root.items[2].name");
    }

    #[test]
    fn test_root_level_violation() {
        let validator = SchemaValidator::compile(&json!({"type": "object"})).unwrap();
        let violation = validator.validate(&json!([1, 2])).unwrap_err();
        assert_eq!(violation.path, "root");
    }

    #[test]
    fn test_duration_format_is_enforced() {
        let validator = SchemaValidator::compile(&json!({
            "type": "object",
            "properties": {"ttl": {"type": "string", "format": "duration"}}
        }))
        .unwrap();
        assert!(validator.validate(&json!({"ttl": "PT30S"})).is_ok());
        let violation = validator.validate(&json!({"ttl": "30 seconds"})).unwrap_err();
        assert_eq!(violation.path, "root.ttl");
    }

    #[test]
    fn test_violation_converts_to_bad_request() {
        let validator = SchemaValidator::compile(&json!({
            "type": "object",
            "properties": {"x": {"type": "integer"}}
        }))
        .unwrap();
        let err: ApiError = validator.validate(&json!({"x": "s"})).unwrap_err().into();
        assert_eq!(err.status(), 400);
        assert_eq!(err.details().unwrap()["path"], "root.x");
    }

    #[test]
    fn test_invalid_schema_is_a_construction_error() {
        let result = SchemaValidator::compile(&json!({"type": "not-a-type"}));
        assert!(matches!(result, Err(ConstructionError::InvalidSchema(_))));
    }
}
