//! Top-level application assembly.
//!
//! [`WebApi`] collects endpoints (by unique name) and a composition tree,
//! validates the settings mapping against the settings schema, derives the
//! `/v{version}` base path, flattens everything into the route table,
//! spawns the handler coroutines and runs all initializers concurrently.
//! Every failure here is a [`ConstructionError`]: it aborts startup and can
//! never surface at request time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::{Api, InitFn, Route};
use crate::context::ApiContext;
use crate::dispatcher::Dispatcher;
use crate::endpoint::Endpoint;
use crate::error::ConstructionError;
use crate::executor::ExecutorPool;
use crate::init;
use crate::paths::join_paths;
use crate::router::Router;
use crate::runtime_config::RuntimeConfig;
use crate::server::AppService;
use crate::settings::{default_settings, merge_defaults};
use crate::validation::schemas::settings_validator;

type EndpointFactory = Box<dyn FnOnce(Arc<ApiContext>) -> Result<Arc<Endpoint>, ConstructionError>>;

/// The assembled application: route table, dispatcher and shared context.
pub struct Application {
    pub router: Arc<Router>,
    pub dispatcher: Arc<Dispatcher>,
    pub context: Arc<ApiContext>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("routes", &self.router.routes().len())
            .finish_non_exhaustive()
    }
}

impl Application {
    /// The ordered route table handed to the HTTP server.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        self.router.routes()
    }

    /// Wrap the application into the `may_minihttp` service.
    #[must_use]
    pub fn into_service(self) -> AppService {
        AppService::new(self.router, self.dispatcher, self.context)
    }
}

/// Builder for a versioned web API.
pub struct WebApi {
    settings: Value,
    endpoints: Vec<(String, EndpointFactory)>,
    root: Api,
    initializer: Option<InitFn>,
    runtime: RuntimeConfig,
}

impl WebApi {
    /// Start an assembly from user settings; missing keys are filled from
    /// the generated defaults. Validation happens at [`WebApi::build`].
    #[must_use]
    pub fn new(settings: Value) -> Self {
        let mut settings = settings;
        merge_defaults(&default_settings(), &mut settings);
        Self {
            settings,
            endpoints: Vec::new(),
            root: Api::new(),
            initializer: None,
            runtime: RuntimeConfig::from_env(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Value {
        &self.settings
    }

    /// Mutable settings access for configuration overlays (CLI `--set`,
    /// config files).
    pub fn settings_mut(&mut self) -> &mut Value {
        &mut self.settings
    }

    /// Names of all registered endpoints, in registration order.
    #[must_use]
    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Register an endpoint under a unique, non-empty name.
    ///
    /// The factory runs at build time with the shared context; its endpoint
    /// must carry the same name.
    pub fn add_endpoint<F>(&mut self, name: &str, factory: F) -> Result<&mut Self, ConstructionError>
    where
        F: FnOnce(Arc<ApiContext>) -> Result<Arc<Endpoint>, ConstructionError> + 'static,
    {
        if name.is_empty() {
            return Err(ConstructionError::EmptyEndpointName);
        }
        if self.endpoints.iter().any(|(n, _)| n == name) {
            return Err(ConstructionError::DuplicateEndpoint(name.to_string()));
        }
        self.endpoints.push((name.to_string(), Box::new(factory)));
        Ok(self)
    }

    /// Attach a sub-API tree below the version base path.
    pub fn attach_subapi(&mut self, path: &str, api: Api) -> Result<&mut Self, ConstructionError> {
        self.root.attach_subapi(path, api)?;
        Ok(self)
    }

    /// Register the application-level initializer.
    pub fn set_initializer<F>(&mut self, init: F) -> &mut Self
    where
        F: Fn(Arc<ApiContext>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    /// Assemble with every registered endpoint enabled.
    pub fn build(self) -> Result<Application, ConstructionError> {
        self.build_filtered(None)
    }

    /// Assemble, keeping only endpoints whose name is in `enable` (all when
    /// absent). The sub-API tree is always included.
    pub fn build_filtered(
        self,
        enable: Option<&HashSet<String>>,
    ) -> Result<Application, ConstructionError> {
        settings_validator()
            .validate(&self.settings)
            .map_err(|violation| ConstructionError::InvalidSettings(violation.to_string()))?;

        let version = self
            .settings
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("1")
            .to_string();
        let base_path = join_paths(&[&format!("v{version}")]);

        let pools = build_pools(&self.settings, self.runtime.stack_size);
        let context = Arc::new(ApiContext::new(self.settings, pools));

        let mut routes: Vec<Route> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut initializers: Vec<InitFn> = Vec::new();
        if let Some(init) = &self.initializer {
            initializers.push(init.clone());
        }

        for (name, factory) in self.endpoints {
            if let Some(enabled) = enable {
                if !enabled.contains(&name) {
                    continue;
                }
            }
            let endpoint = factory(Arc::clone(&context))?;
            if let Some(init) = endpoint.initializer() {
                initializers.push(init);
            }
            for spec in endpoint.collect_routes() {
                let path = join_paths(&[&base_path, &spec.path().replace("{name}", &name)]);
                if !seen.insert(path.clone()) {
                    return Err(ConstructionError::DuplicateRoute(path));
                }
                routes.push(Route {
                    path,
                    handler_name: spec.handler_name().replace("{name}", &name),
                    handler: spec.handler.clone(),
                    response_schema: spec.response_schema.clone(),
                    init: spec.init.clone(),
                });
            }
        }

        self.root.flatten_into(&base_path, &mut routes, &mut seen)?;
        self.root.collect_initializers(&mut initializers);

        init::run_all(&context, initializers)?;

        let mut dispatcher = Dispatcher::new();
        for route in &routes {
            dispatcher.register_route(route, Arc::clone(&context), self.runtime.stack_size);
            info!(path = %route.path, handler_name = %route.handler_name, "Route registered");
        }

        Ok(Application {
            router: Arc::new(Router::new(routes)),
            dispatcher: Arc::new(dispatcher),
            context,
        })
    }
}

/// One worker pool per `threads` entry; the settings schema guarantees a
/// `default` entry whenever the mapping is present, and the defaults merge
/// guarantees the mapping itself.
fn build_pools(settings: &Value, stack_size: usize) -> HashMap<String, Arc<ExecutorPool>> {
    let mut pools = HashMap::new();
    if let Some(threads) = settings.get("threads").and_then(Value::as_object) {
        for (name, workers) in threads {
            let workers = workers.as_u64().unwrap_or(1) as usize;
            pools.insert(
                name.clone(),
                Arc::new(ExecutorPool::new(name.clone(), workers, stack_size)),
            );
        }
    }
    pools
}
