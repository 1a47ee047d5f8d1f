//! # trellis
//!
//! **trellis** is a composition layer for building versioned HTTP JSON APIs
//! on the `may` coroutine runtime: a tree of pluggable endpoint and API
//! modules is flattened into a single route table, validated against a
//! declared configuration schema, initialized concurrently and served with
//! uniform request/response validation and error translation.
//!
//! ## Architecture
//!
//! - **[`api`]** — the composition tree: [`Api`] nodes, sub-API attachment,
//!   deterministic flattening into absolute routes, and the [`WebApi`]
//!   assembly that validates settings and builds the application
//! - **[`endpoint`]** — named endpoints, their routes and reusable addons
//! - **[`health`]** — the health aggregation engine: concurrent,
//!   timeout-bounded probes with optional per-probe TTL caching
//! - **[`validation`]** — compiled JSON schema validators with custom
//!   formats and the `root.key[i]` field-path error contract
//! - **[`context`]** — process-wide [`ApiContext`] and the per-request
//!   [`RequestContext`] facade handlers work against
//! - **[`dispatcher`]** — per-route handler coroutines fed by channels,
//!   panic recovery and uniform error rendering
//! - **[`router`]** — the flattened route table and exact-path lookup
//! - **[`server`]** — `may_minihttp` glue: parsing, default headers,
//!   lifecycle handle
//! - **[`executor`]** — bounded worker pools for blocking work, one per
//!   `threads` settings entry
//! - **[`cli`]** — a `clap`-based runner with config file and inline
//!   setting overrides
//!
//! ## Quick start
//!
//! ```no_run
//! use serde_json::json;
//! use trellis::{Endpoint, HealthAddon, RouteSpec, WebApi};
//!
//! let mut api = WebApi::new(json!({"name": "orders-api"}));
//! api.add_endpoint("orders", |ctx| {
//!     let endpoint = Endpoint::builder("orders", ctx)
//!         .route(RouteSpec::new("{name}", "list_orders", |ctx: &mut trellis::RequestContext| {
//!             ctx.write_json(json!({"orders": []}));
//!             Ok(())
//!         }))
//!         .build()?;
//!     endpoint.add_addon(|ep| {
//!         HealthAddon::builder(ep)
//!             .check("db", std::sync::Arc::new(|| Ok(())))
//!             .build()
//!     })?;
//!     Ok(endpoint)
//! }).unwrap();
//!
//! let application = api.build().unwrap();
//! // trellis::server::ApiServer(application.into_service()).start("0.0.0.0:8000");
//! ```
//!
//! ## Runtime considerations
//!
//! trellis runs on the `may` coroutine runtime, not tokio. Handlers, health
//! probes and initializers all execute in coroutines; anything blocking
//! should be offloaded through [`ApiContext::default_pool`]. Stack sizes are
//! tuned via `TRELLIS_STACK_SIZE`.

pub mod api;
pub mod cli;
pub mod context;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod health;
pub mod ids;
mod init;
pub mod paths;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod settings;
pub mod validation;

pub use api::{Api, Application, InitFn, Route, SubApi, WebApi};
pub use context::{ApiContext, RequestContext};
pub use endpoint::{Endpoint, EndpointAddon, EndpointHandler, RouteSpec};
pub use error::{ApiError, ConstructionError};
pub use health::{CachedCheck, HealthAddon, HealthError, HealthSnapshot, ProbeFn, ProbeOutcome};
pub use ids::RequestId;
pub use validation::{SchemaValidator, SchemaViolation};
