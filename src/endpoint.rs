//! Endpoints and their addons.
//!
//! An [`Endpoint`] is a named unit of functionality: its own routes plus any
//! number of [`EndpointAddon`]s, each contributing further routes. Route
//! paths (and handler names) may contain the `{name}` placeholder, which is
//! substituted with the endpoint's name when the table is flattened — this is
//! what lets a generic addon such as the health check be reused verbatim
//! across endpoints while producing endpoint-scoped paths like
//! `orders/_health`.
//!
//! Ownership: the endpoint owns its addons; addons refer back to the
//! endpoint only through a `Weak` handle, so they can never extend its
//! lifetime, and touching a gone endpoint fails predictably instead of
//! dangling.

use std::sync::{Arc, RwLock, Weak};

use serde_json::{json, Value};

use crate::api::InitFn;
use crate::context::{ApiContext, RequestContext};
use crate::error::{ApiError, ConstructionError};
use crate::validation::SchemaValidator;

/// A request handler attached to a route.
///
/// Handlers receive the per-request [`RequestContext`] and either populate
/// the response through it or fail with an [`ApiError`]; the dispatcher
/// renders either outcome uniformly.
pub trait EndpointHandler: Send + Sync + 'static {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), ApiError>;
}

impl<F> EndpointHandler for F
where
    F: Fn(&mut RequestContext) -> Result<(), ApiError> + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        self(ctx)
    }
}

/// A route contributed by an endpoint, an addon or an API node: a relative
/// path (possibly `{name}`-templated), the handler and its identity, an
/// optional response schema and the init-args mapping.
#[derive(Clone)]
pub struct RouteSpec {
    pub(crate) path: String,
    pub(crate) handler_name: String,
    pub(crate) handler: Arc<dyn EndpointHandler>,
    pub(crate) response_schema: Option<Arc<SchemaValidator>>,
    pub(crate) init: Value,
}

impl RouteSpec {
    pub fn new(
        path: impl Into<String>,
        handler_name: impl Into<String>,
        handler: impl EndpointHandler,
    ) -> Self {
        Self {
            path: path.into(),
            handler_name: handler_name.into(),
            handler: Arc::new(handler),
            response_schema: None,
            init: json!({}),
        }
    }

    /// Declare a response schema; the handler's JSON body is validated
    /// against it before being written, and a violation becomes a 500.
    #[must_use]
    pub fn with_response_schema(mut self, schema: Arc<SchemaValidator>) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Attach initialization arguments, available to the handler via
    /// [`RequestContext::init`].
    #[must_use]
    pub fn with_init(mut self, init: Value) -> Self {
        self.init = init;
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }
}

impl std::fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSpec")
            .field("path", &self.path)
            .field("handler_name", &self.handler_name)
            .finish()
    }
}

/// Optional, reusable behavior attached to an endpoint.
///
/// At most one addon per kind may be registered on an endpoint; a second
/// registration of the same kind is a construction error rather than a
/// silent replacement.
pub trait EndpointAddon: Send + Sync + 'static {
    /// Stable addon kind key, unique per endpoint.
    fn kind(&self) -> &'static str;

    /// Routes this addon contributes to its endpoint.
    fn routes(&self) -> Vec<RouteSpec>;
}

/// A named unit exposing routes plus optional addons.
pub struct Endpoint {
    name: String,
    context: Arc<ApiContext>,
    routes: Vec<RouteSpec>,
    initializer: Option<InitFn>,
    addons: RwLock<Vec<Arc<dyn EndpointAddon>>>,
}

impl Endpoint {
    pub fn builder(name: impl Into<String>, context: Arc<ApiContext>) -> EndpointBuilder {
        EndpointBuilder {
            name: name.into(),
            context,
            routes: Vec::new(),
            initializer: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ApiContext> {
        &self.context
    }

    /// Attach an addon built from a weak handle to this endpoint.
    ///
    /// The closure receives the non-owning back-reference the addon must use
    /// for any later access to the endpoint.
    pub fn add_addon<A, F>(self: &Arc<Self>, build: F) -> Result<Arc<A>, ConstructionError>
    where
        A: EndpointAddon,
        F: FnOnce(Weak<Endpoint>) -> A,
    {
        let addon = Arc::new(build(Arc::downgrade(self)));
        let mut addons = self
            .addons
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if addons.iter().any(|a| a.kind() == addon.kind()) {
            return Err(ConstructionError::DuplicateAddon(addon.kind()));
        }
        addons.push(addon.clone() as Arc<dyn EndpointAddon>);
        Ok(addon)
    }

    /// Look up an addon by kind.
    #[must_use]
    pub fn get_addon(&self, kind: &str) -> Option<Arc<dyn EndpointAddon>> {
        self.addons
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|a| a.kind() == kind)
            .cloned()
    }

    pub(crate) fn initializer(&self) -> Option<InitFn> {
        self.initializer.clone()
    }

    /// Own routes followed by every addon's routes, in registration order.
    pub(crate) fn collect_routes(&self) -> Vec<RouteSpec> {
        let mut routes = self.routes.clone();
        let addons = self
            .addons
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for addon in addons.iter() {
            routes.extend(addon.routes());
        }
        routes
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// Builder for [`Endpoint`]; routes and the optional initializer are fixed
/// at build time, addons may be attached to the built endpoint afterwards.
pub struct EndpointBuilder {
    name: String,
    context: Arc<ApiContext>,
    routes: Vec<RouteSpec>,
    initializer: Option<InitFn>,
}

impl EndpointBuilder {
    #[must_use]
    pub fn route(mut self, spec: RouteSpec) -> Self {
        self.routes.push(spec);
        self
    }

    /// Register an initializer run concurrently with all others before the
    /// server starts serving.
    #[must_use]
    pub fn initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(Arc<ApiContext>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    pub fn build(self) -> Result<Arc<Endpoint>, ConstructionError> {
        if self.name.is_empty() {
            return Err(ConstructionError::EmptyEndpointName);
        }
        Ok(Arc::new(Endpoint {
            name: self.name,
            context: self.context,
            routes: self.routes,
            initializer: self.initializer,
            addons: RwLock::new(Vec::new()),
        }))
    }
}
