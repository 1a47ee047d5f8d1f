//! Process-wide and per-request context.
//!
//! [`ApiContext`] is created once at assembly: the validated settings, the
//! worker pools and whatever the application wants to share with every
//! handler. [`RequestContext`] is the per-request facade handlers actually
//! talk to: schema-validated parameter and body extraction, JSON response
//! writing and status/header accumulation. Failures surface as
//! [`ApiError`] and are rendered into the uniform error body at the dispatch
//! boundary.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use serde_json::{Map, Value};

use crate::dispatcher::{HandlerResponse, HeaderVec};
use crate::error::ApiError;
use crate::executor::ExecutorPool;
use crate::ids::RequestId;
use crate::validation::SchemaValidator;

/// Shared application context: validated settings plus the named worker
/// pools. Read-only after assembly and safe to share across all in-flight
/// requests.
pub struct ApiContext {
    settings: Value,
    pools: HashMap<String, Arc<ExecutorPool>>,
}

impl ApiContext {
    /// Build a context from already-validated settings and the pools derived
    /// from its `threads` mapping.
    #[must_use]
    pub fn new(settings: Value, pools: HashMap<String, Arc<ExecutorPool>>) -> Self {
        Self { settings, pools }
    }

    #[must_use]
    pub fn settings(&self) -> &Value {
        &self.settings
    }

    fn setting_str(&self, key: &str) -> &str {
        self.settings.get(key).and_then(Value::as_str).unwrap_or("")
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.setting_str("name")
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.setting_str("id")
    }

    #[must_use]
    pub fn version(&self) -> &str {
        self.setting_str("version")
    }

    /// The response banner sent in the `Server` header.
    #[must_use]
    pub fn server(&self) -> &str {
        self.setting_str("server")
    }

    /// Look up a worker pool by its `threads` key.
    #[must_use]
    pub fn pool(&self, name: &str) -> Option<&Arc<ExecutorPool>> {
        self.pools.get(name)
    }

    /// The mandatory `default` worker pool.
    pub fn default_pool(&self) -> Result<&Arc<ExecutorPool>, ApiError> {
        self.pools
            .get("default")
            .ok_or_else(|| ApiError::new(500).with_message("default worker pool is missing"))
    }
}

/// Per-request facade handed to handlers.
///
/// Owns the parsed request data and accumulates the response; the dispatcher
/// turns it into a [`HandlerResponse`] once the handler returns.
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderVec,
    raw_body: Option<String>,
    init: Value,
    api: Arc<ApiContext>,
    status: u16,
    response_headers: HeaderVec,
    body: Option<Value>,
}

impl RequestContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        request_id: RequestId,
        method: Method,
        path: String,
        query: Vec<(String, String)>,
        headers: HeaderVec,
        raw_body: Option<String>,
        init: Value,
        api: Arc<ApiContext>,
    ) -> Self {
        Self {
            request_id,
            method,
            path,
            query,
            headers,
            raw_body,
            init,
            api,
            status: 200,
            response_headers: HeaderVec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Initialization arguments attached to the matched route.
    #[must_use]
    pub fn init(&self) -> &Value {
        &self.init
    }

    #[must_use]
    pub fn api(&self) -> &Arc<ApiContext> {
        &self.api
    }

    /// Last value of a raw query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rfind(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Request header by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Extract and validate the query parameters against a schema.
    ///
    /// Values are coerced to the property types the schema declares; an
    /// array-typed property with an `itemSeparator` collapses its raw value
    /// into separate items. Violations surface as a 400.
    pub fn params(&self, schema: &SchemaValidator) -> Result<Value, ApiError> {
        let params = extract_params(&self.query, schema.schema());
        schema.validate(&params)?;
        Ok(params)
    }

    /// Parse the request body as JSON, optionally validating it.
    ///
    /// An absent body is `Ok(None)`, not an error; a malformed body is a 400
    /// with message "Malformed JSON"; a schema violation is a 400 carrying
    /// the violating field path.
    pub fn json_body(&self, schema: Option<&SchemaValidator>) -> Result<Option<Value>, ApiError> {
        let Some(raw) = &self.raw_body else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(raw)
            .map_err(|_| ApiError::new(400).with_message("Malformed JSON"))?;
        if let Some(schema) = schema {
            schema.validate(&value)?;
        }
        Ok(Some(value))
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.response_headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.response_headers.push((Arc::from(name), value.into()));
    }

    /// Set the JSON response body.
    pub fn write_json(&mut self, value: Value) {
        self.body = Some(value);
    }

    pub(crate) fn into_response(self) -> HandlerResponse {
        HandlerResponse {
            status: self.status,
            headers: self.response_headers,
            body: self.body,
        }
    }
}

/// Build a JSON object from raw query pairs, guided by the schema's declared
/// properties.
///
/// Multi-valued keys collapse into arrays for array-typed properties (split
/// on the property's `itemSeparator` when one is declared); for scalar
/// properties the last value wins. Undeclared keys stay raw strings so that
/// `additionalProperties: false` schemas reject them.
fn extract_params(query: &[(String, String)], schema: &Value) -> Value {
    let props = schema.get("properties").and_then(Value::as_object);

    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for (key, value) in query {
        match grouped.iter_mut().find(|(k, _)| *k == key.as_str()) {
            Some((_, values)) => values.push(value.as_str()),
            None => grouped.push((key.as_str(), vec![value.as_str()])),
        }
    }

    let mut out = Map::new();
    for (key, values) in grouped {
        let prop = props.and_then(|p| p.get(key));
        let prop_type = prop
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("string");
        let value = if prop_type == "array" {
            let items_schema = prop.and_then(|p| p.get("items"));
            let separator = prop
                .and_then(|p| p.get("itemSeparator"))
                .and_then(Value::as_str);
            let mut items = Vec::new();
            for raw in values {
                match separator {
                    Some(sep) => items.extend(
                        raw.split(sep)
                            .filter(|s| !s.is_empty())
                            .map(|s| convert_primitive(s.trim(), items_schema)),
                    ),
                    None => items.push(convert_primitive(raw, items_schema)),
                }
            }
            Value::Array(items)
        } else {
            convert_primitive(values.last().copied().unwrap_or(""), prop)
        };
        out.insert(key.to_string(), value);
    }
    Value::Object(out)
}

/// Coerce a raw string to the primitive type the schema declares, falling
/// back to the string itself on a failed parse (validation then reports the
/// mismatch).
fn convert_primitive(raw: &str, schema: Option<&Value>) -> Value {
    let ty = schema.and_then(|s| s.get("type")).and_then(Value::as_str);
    match ty {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some("number") => raw
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some("boolean") => raw
            .parse::<bool>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_context(query: Vec<(String, String)>, raw_body: Option<String>) -> RequestContext {
        let api = Arc::new(ApiContext::new(
            crate::settings::default_settings(),
            HashMap::new(),
        ));
        RequestContext::new(
            RequestId::new(),
            Method::GET,
            "/v1/orders".to_string(),
            query,
            HeaderVec::new(),
            raw_body,
            json!({}),
            api,
        )
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_params_split_on_item_separator() {
        let schema = SchemaValidator::compile(&json!({
            "additionalProperties": false,
            "type": "object",
            "properties": {
                "check": {"type": "array", "itemSeparator": ",", "items": {"type": "string"}}
            }
        }))
        .unwrap();
        let ctx = test_context(pairs(&[("check", "db,cache")]), None);
        let params = ctx.params(&schema).unwrap();
        assert_eq!(params, json!({"check": ["db", "cache"]}));
    }

    #[test]
    fn test_params_coerce_scalar_types() {
        let schema = SchemaValidator::compile(&json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer"},
                "verbose": {"type": "boolean"}
            }
        }))
        .unwrap();
        let ctx = test_context(pairs(&[("limit", "10"), ("verbose", "true")]), None);
        let params = ctx.params(&schema).unwrap();
        assert_eq!(params, json!({"limit": 10, "verbose": true}));
    }

    #[test]
    fn test_params_reject_undeclared_keys() {
        let schema =
            SchemaValidator::compile(&crate::validation::schemas::NO_PARAMS.clone()).unwrap();
        let ctx = test_context(pairs(&[("bogus", "1")]), None);
        let err = ctx.params(&schema).unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_params_last_value_wins_for_scalars() {
        let schema = SchemaValidator::compile(&json!({
            "type": "object",
            "properties": {"limit": {"type": "integer"}}
        }))
        .unwrap();
        let ctx = test_context(pairs(&[("limit", "10"), ("limit", "20")]), None);
        let params = ctx.params(&schema).unwrap();
        assert_eq!(params, json!({"limit": 20}));
    }

    #[test]
    fn test_json_body_absent_is_none() {
        let ctx = test_context(Vec::new(), None);
        assert_eq!(ctx.json_body(None).unwrap(), None);
    }

    #[test]
    fn test_json_body_malformed_is_bad_request() {
        let ctx = test_context(Vec::new(), Some("{bad json".to_string()));
        let err = ctx.json_body(None).unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.message(), "Malformed JSON");
    }

    #[test]
    fn test_json_body_schema_violation_carries_path() {
        let schema = SchemaValidator::compile(&json!({
            "type": "object",
            "properties": {"x": {"type": "integer"}}
        }))
        .unwrap();
        let ctx = test_context(Vec::new(), Some(r#"{"x": "s"}"#.to_string()));
        let err = ctx.json_body(Some(&schema)).unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.details().unwrap()["path"], "root.x");
    }

    #[test]
    fn test_response_accumulation() {
        let mut ctx = test_context(Vec::new(), None);
        ctx.set_status(201);
        ctx.set_header("Location", "/v1/orders/7");
        ctx.write_json(json!({"id": 7}));
        let response = ctx.into_response();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, Some(json!({"id": 7})));
        assert_eq!(response.headers.len(), 1);
    }
}
