//! Error taxonomy for the composition layer.
//!
//! [`ConstructionError`] covers everything that can go wrong while the API
//! tree is being assembled; it is fatal at startup and never reaches request
//! time. [`ApiError`] is the single currency for request-time failures: every
//! handler error, validation failure or explicit business rejection is an
//! `ApiError` and is rendered as the uniform JSON error body at the dispatch
//! boundary. Anything else (a panicking handler) becomes a detail-free 500.

use serde_json::{Map, Value};
use thiserror::Error;

/// Standard HTTP reason phrase for a status code.
///
/// Used as the default error message whenever a handler raises an
/// [`ApiError`] without declaring one.
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// Request-time error carrying an HTTP status, an optional message and
/// optional structured details.
///
/// The status determines the default message (the HTTP reason phrase);
/// details are merged verbatim into the `error` object of the rendered body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    status: u16,
    message: Option<String>,
    details: Option<Map<String, Value>>,
}

impl ApiError {
    /// Create an error for a status code, clamped into the valid
    /// `[100, 599]` HTTP range.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status: status.clamp(100, 599),
            message: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The declared message, falling back to the standard reason phrase.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| reason_phrase(self.status))
    }

    #[must_use]
    pub fn details(&self) -> Option<&Map<String, Value>> {
        self.details.as_ref()
    }

    /// Render the uniform error body:
    /// `{"code": status, "message": reason, "error": {"message": ..., ...details}}`.
    #[must_use]
    pub fn body(&self) -> Value {
        let mut error = Map::new();
        error.insert("message".into(), Value::String(self.message().to_string()));
        if let Some(details) = &self.details {
            for (key, value) in details {
                error.insert(key.clone(), value.clone());
            }
        }
        serde_json::json!({
            "code": self.status,
            "message": reason_phrase(self.status),
            "error": Value::Object(error),
        })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message())
    }
}

impl std::error::Error for ApiError {}

/// Assembly-time failure. Construction errors abort startup; by the time a
/// request is served none of these can occur anymore.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("endpoint name must not be empty")]
    EmptyEndpointName,
    #[error("duplicate endpoint name: {0}")]
    DuplicateEndpoint(String),
    #[error("sub-API attach path must not be empty")]
    EmptyAttachPath,
    #[error("sub-API already attached at path: {0}")]
    DuplicateSubApi(String),
    #[error("duplicate route path: {0}")]
    DuplicateRoute(String),
    #[error("routes cannot be added once the table has been flattened")]
    Sealed,
    #[error("duplicate addon kind: {0}")]
    DuplicateAddon(&'static str),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("initialization failed: {0}")]
    InitFailed(String),
}
