//! Built-in schemas: application settings, health snapshot and health params.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use super::SchemaValidator;

/// Schema every application settings mapping must satisfy at assembly time.
pub static SETTINGS: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string", "minLength": 1},
            "id": {"type": "string", "minLength": 1},
            "version": {"type": "string", "minLength": 1},
            "server": {"type": "string", "minLength": 1},
            "deprecated_versions": {
                "type": "array",
                "items": {"type": "string", "minLength": 1}
            },
            "threads": {
                "type": "object",
                "properties": {
                    "default": {"type": "integer", "minimum": 1}
                },
                "additionalProperties": {"type": "integer", "minimum": 1},
                "required": ["default"]
            }
        },
        "required": ["name", "id", "version", "server"]
    })
});

/// Response schema for the health snapshot body.
pub static HEALTH: Lazy<Value> = Lazy::new(|| {
    json!({
        "additionalProperties": false,
        "type": "object",
        "properties": {
            "ok": {"type": "boolean"},
            "ok_as_string": {"type": "string", "enum": ["yes", "no"]},
            "errors": {
                "type": "array",
                "items": {
                    "additionalProperties": false,
                    "properties": {
                        "source": {"type": ["null", "string"], "minLength": 1},
                        "reason": {"type": ["null", "string"], "minLength": 1},
                        "exception": {"type": ["null", "string"], "minLength": 1}
                    },
                    "required": ["source", "reason", "exception"]
                }
            }
        },
        "required": ["ok", "ok_as_string", "errors"]
    })
});

/// Query parameter schema for the health endpoint: an optional `check`
/// allow-list, comma-separated.
pub static HEALTH_PARAMS: Lazy<Value> = Lazy::new(|| {
    json!({
        "additionalProperties": false,
        "type": "object",
        "properties": {
            "check": {
                "type": "array",
                "itemSeparator": ",",
                "items": {"type": "string"}
            }
        }
    })
});

/// Schema for handlers that accept no query parameters at all.
pub static NO_PARAMS: Lazy<Value> = Lazy::new(|| json!({"additionalProperties": false}));

static SETTINGS_VALIDATOR: Lazy<Arc<SchemaValidator>> = Lazy::new(|| {
    Arc::new(SchemaValidator::compile(&SETTINGS).expect("settings schema compiles"))
});

static HEALTH_VALIDATOR: Lazy<Arc<SchemaValidator>> = Lazy::new(|| {
    Arc::new(SchemaValidator::compile(&HEALTH).expect("health schema compiles"))
});

static HEALTH_PARAMS_VALIDATOR: Lazy<Arc<SchemaValidator>> = Lazy::new(|| {
    Arc::new(SchemaValidator::compile(&HEALTH_PARAMS).expect("health params schema compiles"))
});

/// Compiled settings validator, shared process-wide.
pub fn settings_validator() -> Arc<SchemaValidator> {
    SETTINGS_VALIDATOR.clone()
}

/// Compiled health snapshot validator, shared process-wide.
pub fn health_validator() -> Arc<SchemaValidator> {
    HEALTH_VALIDATOR.clone()
}

/// Compiled health params validator, shared process-wide.
pub fn health_params_validator() -> Arc<SchemaValidator> {
    HEALTH_PARAMS_VALIDATOR.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_schema_accepts_minimal_config() {
        let settings = json!({
            "name": "orders",
            "id": "abc123",
            "version": "1",
            "server": "orders/0.1.0"
        });
        assert!(settings_validator().validate(&settings).is_ok());
    }

    #[test]
    fn test_settings_schema_requires_default_pool() {
        let settings = json!({
            "name": "orders",
            "id": "abc123",
            "version": "1",
            "server": "orders/0.1.0",
            "threads": {"io": 4}
        });
        let violation = settings_validator().validate(&settings).unwrap_err();
        assert_eq!(violation.path, "root.threads");
    }

    #[test]
    fn test_health_schema_matches_snapshot_shape() {
        let body = json!({
            "ok": false,
            "ok_as_string": "no",
            "errors": [
                {"source": "db", "reason": "connection refused", "exception": null}
            ]
        });
        assert!(health_validator().validate(&body).is_ok());
    }
}
