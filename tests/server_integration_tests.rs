//! End-to-end tests over a real TCP server: route dispatch, the uniform
//! error body, request/response validation and the default response headers.

mod common;

use std::sync::Arc;

use serde_json::json;
use trellis::validation::SchemaValidator;
use trellis::{ApiError, Endpoint, RequestContext, RouteSpec, WebApi};

use common::{get, post_json, start_service};

fn sample_settings() -> serde_json::Value {
    json!({
        "name": "orders-api",
        "id": "it-0001",
        "version": "1",
        "server": "orders-api/0.1.0",
        "threads": {"default": 2}
    })
}

fn build_api() -> WebApi {
    let body_schema = Arc::new(
        SchemaValidator::compile(&json!({
            "type": "object",
            "properties": {"x": {"type": "integer"}},
            "required": ["x"]
        }))
        .unwrap(),
    );
    let response_schema = Arc::new(
        SchemaValidator::compile(&json!({
            "type": "object",
            "properties": {"count": {"type": "integer"}},
            "required": ["count"]
        }))
        .unwrap(),
    );

    let mut api = WebApi::new(sample_settings());
    api.add_endpoint("orders", move |ctx| {
        let body_schema = Arc::clone(&body_schema);
        Endpoint::builder("orders", ctx)
            .route(RouteSpec::new(
                "{name}",
                "list_orders",
                |ctx: &mut RequestContext| {
                    ctx.write_json(json!({"orders": []}));
                    Ok(())
                },
            ))
            .route(RouteSpec::new(
                "{name}/echo",
                "echo_order",
                move |ctx: &mut RequestContext| {
                    let body = ctx.json_body(Some(&body_schema))?;
                    match body {
                        Some(value) => ctx.write_json(value),
                        None => ctx.write_json(json!({"empty": true})),
                    }
                    Ok(())
                },
            ))
            .route(
                RouteSpec::new(
                    "{name}/broken",
                    "broken_orders",
                    |ctx: &mut RequestContext| {
                        ctx.write_json(json!({"count": "not-a-number"}));
                        Ok(())
                    },
                )
                .with_response_schema(response_schema.clone()),
            )
            .route(RouteSpec::new(
                "{name}/teapot",
                "teapot",
                |_: &mut RequestContext| {
                    Err(ApiError::new(409).with_message("order already exists"))
                },
            ))
            .build()
    })
    .unwrap();
    api
}

#[test]
fn test_routes_and_default_headers() {
    let app = build_api().build().unwrap();
    let (handle, addr) = start_service(app.into_service());

    let response = get(&addr, "/v1/orders");
    handle.stop();

    assert_eq!(response.status, 200);
    assert_eq!(response.json(), json!({"orders": []}));
    assert_eq!(response.headers.get("api").unwrap(), "orders-api");
    assert_eq!(response.headers.get("api-version").unwrap(), "1");
    assert_eq!(response.headers.get("server").unwrap(), "orders-api/0.1.0");
    assert_eq!(
        response.headers.get("content-type").unwrap(),
        "application/json"
    );
    assert!(response.headers.contains_key("request-id"));
}

#[test]
fn test_unknown_path_renders_uniform_404() {
    let app = build_api().build().unwrap();
    let (handle, addr) = start_service(app.into_service());

    let response = get(&addr, "/v1/nope");
    handle.stop();

    assert_eq!(response.status, 404);
    let body = response.json();
    assert_eq!(body["code"], 404);
    assert_eq!(body["message"], "Not Found");
    assert_eq!(body["error"]["message"], "Not Found");
}

#[test]
fn test_malformed_json_body_is_rejected() {
    let app = build_api().build().unwrap();
    let (handle, addr) = start_service(app.into_service());

    let response = post_json(&addr, "/v1/orders/echo", "{bad json");
    handle.stop();

    assert_eq!(response.status, 400);
    let body = response.json();
    assert_eq!(body["error"]["message"], "Malformed JSON");
}

#[test]
fn test_body_schema_violation_carries_field_path() {
    let app = build_api().build().unwrap();
    let (handle, addr) = start_service(app.into_service());

    let response = post_json(&addr, "/v1/orders/echo", r#"{"x": "s"}"#);
    handle.stop();

    assert_eq!(response.status, 400);
    assert_eq!(response.json()["error"]["path"], "root.x");
}

#[test]
fn test_valid_body_round_trips() {
    let app = build_api().build().unwrap();
    let (handle, addr) = start_service(app.into_service());

    let response = post_json(&addr, "/v1/orders/echo", r#"{"x": 3}"#);
    handle.stop();

    assert_eq!(response.status, 200);
    assert_eq!(response.json(), json!({"x": 3}));
}

#[test]
fn test_empty_body_is_not_an_error() {
    let app = build_api().build().unwrap();
    let (handle, addr) = start_service(app.into_service());

    let response = post_json(&addr, "/v1/orders/echo", "");
    handle.stop();

    assert_eq!(response.status, 200);
    assert_eq!(response.json(), json!({"empty": true}));
}

#[test]
fn test_response_schema_violation_is_hidden_behind_500() {
    let app = build_api().build().unwrap();
    let (handle, addr) = start_service(app.into_service());

    let response = get(&addr, "/v1/orders/broken");
    handle.stop();

    assert_eq!(response.status, 500);
    let body = response.json();
    assert_eq!(body["code"], 500);
    // The handler's malformed value never reaches the wire.
    assert!(!response.body.contains("not-a-number"));
}

#[test]
fn test_application_error_renders_uniform_body() {
    let app = build_api().build().unwrap();
    let (handle, addr) = start_service(app.into_service());

    let response = get(&addr, "/v1/orders/teapot");
    handle.stop();

    assert_eq!(response.status, 409);
    let body = response.json();
    assert_eq!(body["code"], 409);
    assert_eq!(body["message"], "Conflict");
    assert_eq!(body["error"]["message"], "order already exists");
}

#[test]
fn test_route_table_is_deterministic() {
    let first: Vec<String> = build_api()
        .build()
        .unwrap()
        .routes()
        .iter()
        .map(|r| r.path.clone())
        .collect();
    let second: Vec<String> = build_api()
        .build()
        .unwrap()
        .routes()
        .iter()
        .map(|r| r.path.clone())
        .collect();
    assert_eq!(first, second);
    assert_eq!(first[0], "/v1/orders");
}
