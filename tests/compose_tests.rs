//! Assembly-level tests: mixing endpoints, addons and nested sub-API trees,
//! and the construction-time failure modes.

use std::sync::Arc;

use serde_json::json;
use trellis::{Api, ConstructionError, Endpoint, HealthAddon, RequestContext, RouteSpec, WebApi};

fn sample_settings() -> serde_json::Value {
    json!({
        "name": "billing",
        "id": "ct-0001",
        "version": "3",
        "server": "billing/0.1.0",
        "threads": {"default": 1}
    })
}

fn noop(_: &mut RequestContext) -> Result<(), trellis::ApiError> {
    Ok(())
}

#[test]
fn test_endpoints_and_subapis_flatten_together() {
    let mut reports = Api::new();
    reports.add_route(RouteSpec::new("daily", "daily_report", noop)).unwrap();
    let mut internal = Api::new();
    internal.attach_subapi("reports", reports).unwrap();
    internal.add_route(RouteSpec::new("status", "internal_status", noop)).unwrap();

    let mut api = WebApi::new(sample_settings());
    api.add_endpoint("invoices", |ctx| {
        let endpoint = Endpoint::builder("invoices", ctx)
            .route(RouteSpec::new("{name}", "list_invoices", noop))
            .build()?;
        endpoint.add_addon(|ep| {
            HealthAddon::builder(ep)
                .check("store", Arc::new(|| Ok(())))
                .build()
        })?;
        Ok(endpoint)
    })
    .unwrap();
    api.attach_subapi("internal", internal).unwrap();

    let app = api.build().unwrap();
    let paths: Vec<&str> = app.routes().iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/v3/invoices",
            "/v3/invoices/_health",
            "/v3/internal/status",
            "/v3/internal/reports/daily",
        ]
    );
}

#[test]
fn test_handler_names_are_name_substituted() {
    let mut api = WebApi::new(sample_settings());
    api.add_endpoint("invoices", |ctx| {
        let endpoint = Endpoint::builder("invoices", ctx).build()?;
        endpoint.add_addon(|ep| HealthAddon::builder(ep).build())?;
        Ok(endpoint)
    })
    .unwrap();
    let app = api.build().unwrap();
    assert_eq!(app.routes()[0].handler_name, "invoices_health");
}

#[test]
fn test_duplicate_endpoint_is_construction_time() {
    let mut api = WebApi::new(sample_settings());
    api.add_endpoint("invoices", |ctx| Endpoint::builder("invoices", ctx).build())
        .unwrap();
    let result = api.add_endpoint("invoices", |ctx| Endpoint::builder("invoices", ctx).build());
    assert!(matches!(
        result,
        Err(ConstructionError::DuplicateEndpoint(name)) if name == "invoices"
    ));
}

#[test]
fn test_colliding_endpoint_and_subapi_paths_fail_at_flatten() {
    let mut clashing = Api::new();
    clashing.add_route(RouteSpec::new("", "clash", noop)).unwrap();

    let mut api = WebApi::new(sample_settings());
    api.add_endpoint("invoices", |ctx| {
        Endpoint::builder("invoices", ctx)
            .route(RouteSpec::new("{name}", "list_invoices", noop))
            .build()
    })
    .unwrap();
    api.attach_subapi("invoices", clashing).unwrap();

    let result = api.build();
    assert!(matches!(result, Err(ConstructionError::DuplicateRoute(_))));
}

#[test]
fn test_initializers_run_across_tree_and_endpoints() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    let counter = Arc::new(AtomicUsize::new(0));

    let mut sub = Api::new();
    let sub_counter = Arc::clone(&counter);
    sub.set_initializer(move |_ctx| {
        sub_counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let mut api = WebApi::new(sample_settings());
    let root_counter = Arc::clone(&counter);
    api.set_initializer(move |_ctx| {
        root_counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let ep_counter = Arc::clone(&counter);
    api.add_endpoint("invoices", move |ctx| {
        Endpoint::builder("invoices", ctx)
            .initializer(move |_ctx| {
                ep_counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
    })
    .unwrap();
    api.attach_subapi("internal", sub).unwrap();

    let _app = api.build().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn test_failing_initializer_aborts_build() {
    let mut api = WebApi::new(sample_settings());
    api.set_initializer(|_ctx| Err(anyhow::anyhow!("warm-up failed")));
    let result = api.build();
    match result {
        Err(ConstructionError::InitFailed(message)) => assert!(message.contains("warm-up failed")),
        other => panic!("expected InitFailed, got {other:?}"),
    }
}
