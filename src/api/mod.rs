//! The API composition tree.
//!
//! An [`Api`] node owns its routes and a collection of sub-APIs, each
//! attached at a relative path. [`Api::flatten`] walks the tree depth-first
//! in insertion order and produces the absolute route table; flattening the
//! same tree twice yields the identical sequence. Once flattened, a node's
//! structure is sealed: further `add_route`/`attach_subapi` calls are
//! construction errors.

mod webapi;

pub use webapi::{Application, WebApi};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::context::ApiContext;
use crate::endpoint::{EndpointHandler, RouteSpec};
use crate::error::ConstructionError;
use crate::paths::join_paths;
use crate::validation::SchemaValidator;

/// An initializer run concurrently with all others before the server starts.
pub type InitFn = Arc<dyn Fn(Arc<ApiContext>) -> anyhow::Result<()> + Send + Sync>;

/// A flattened route: absolute path, handler identity and object, optional
/// response schema and the init-args mapping.
#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub handler_name: String,
    pub(crate) handler: Arc<dyn EndpointHandler>,
    pub(crate) response_schema: Option<Arc<SchemaValidator>>,
    pub init: Value,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("handler_name", &self.handler_name)
            .finish()
    }
}

/// A child node attached to its parent at a relative path.
pub struct SubApi {
    path: String,
    api: Api,
}

impl SubApi {
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn api(&self) -> &Api {
        &self.api
    }
}

/// A node in the composition tree: own routes plus sub-APIs.
#[derive(Default)]
pub struct Api {
    routes: Vec<RouteSpec>,
    subapis: Vec<SubApi>,
    initializer: Option<InitFn>,
    sealed: AtomicBool,
}

impl Api {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), ConstructionError> {
        if self.sealed.load(Ordering::Relaxed) {
            return Err(ConstructionError::Sealed);
        }
        Ok(())
    }

    /// Append a route to this node's own route list.
    ///
    /// Fails once the tree has been flattened, or when this node already has
    /// a route at the same relative path.
    pub fn add_route(&mut self, spec: RouteSpec) -> Result<&mut Self, ConstructionError> {
        self.check_open()?;
        let normalized = join_paths(&[spec.path()]);
        if self
            .routes
            .iter()
            .any(|r| join_paths(&[r.path()]) == normalized)
        {
            return Err(ConstructionError::DuplicateRoute(spec.path().to_string()));
        }
        self.routes.push(spec);
        Ok(self)
    }

    /// Attach a child node at a relative path.
    ///
    /// The path must be non-empty and unique among this node's children.
    pub fn attach_subapi(&mut self, path: &str, api: Api) -> Result<&mut Self, ConstructionError> {
        self.check_open()?;
        let normalized = join_paths(&[path]);
        if normalized == "/" {
            return Err(ConstructionError::EmptyAttachPath);
        }
        if self
            .subapis
            .iter()
            .any(|sub| join_paths(&[&sub.path]) == normalized)
        {
            return Err(ConstructionError::DuplicateSubApi(path.to_string()));
        }
        self.subapis.push(SubApi {
            path: path.to_string(),
            api,
        });
        Ok(self)
    }

    /// Register this node's initializer.
    pub fn set_initializer<F>(&mut self, init: F) -> &mut Self
    where
        F: Fn(Arc<ApiContext>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    #[must_use]
    pub fn routes(&self) -> &[RouteSpec] {
        &self.routes
    }

    /// Walk sub-APIs up to `max_depth` levels deep, in insertion order.
    ///
    /// `Some(0)` yields direct children only; `None` the whole subtree.
    #[must_use]
    pub fn iter_subapis(&self, max_depth: Option<usize>) -> Vec<&SubApi> {
        let mut out = Vec::new();
        self.collect_subapis(max_depth, 0, &mut out);
        out
    }

    fn collect_subapis<'a>(
        &'a self,
        max_depth: Option<usize>,
        depth: usize,
        out: &mut Vec<&'a SubApi>,
    ) {
        for sub in &self.subapis {
            out.push(sub);
            if max_depth.map_or(true, |max| depth < max) {
                sub.api.collect_subapis(max_depth, depth + 1, out);
            }
        }
    }

    /// Flatten the subtree into absolute routes under `base_path` and seal
    /// every visited node.
    ///
    /// Traversal is depth-first in insertion order: a node's own routes
    /// first, then each child in attach order. Duplicate absolute paths are
    /// construction errors.
    pub fn flatten(&self, base_path: &str) -> Result<Vec<Route>, ConstructionError> {
        let mut routes = Vec::new();
        let mut seen = HashSet::new();
        self.flatten_into(base_path, &mut routes, &mut seen)?;
        Ok(routes)
    }

    pub(crate) fn flatten_into(
        &self,
        base_path: &str,
        routes: &mut Vec<Route>,
        seen: &mut HashSet<String>,
    ) -> Result<(), ConstructionError> {
        self.sealed.store(true, Ordering::Relaxed);
        for spec in &self.routes {
            let path = join_paths(&[base_path, spec.path()]);
            if !seen.insert(path.clone()) {
                return Err(ConstructionError::DuplicateRoute(path));
            }
            routes.push(Route {
                path,
                handler_name: spec.handler_name.clone(),
                handler: spec.handler.clone(),
                response_schema: spec.response_schema.clone(),
                init: spec.init.clone(),
            });
        }
        for sub in &self.subapis {
            let child_base = join_paths(&[base_path, &sub.path]);
            sub.api.flatten_into(&child_base, routes, seen)?;
        }
        Ok(())
    }

    pub(crate) fn collect_initializers(&self, out: &mut Vec<InitFn>) {
        if let Some(init) = &self.initializer {
            out.push(init.clone());
        }
        for sub in &self.subapis {
            sub.api.collect_initializers(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;

    fn noop_route(path: &str, name: &str) -> RouteSpec {
        RouteSpec::new(path, name, |_: &mut RequestContext| Ok(()))
    }

    fn sample_tree() -> Api {
        let mut inner = Api::new();
        inner.add_route(noop_route("status", "inner_status")).unwrap();

        let mut child = Api::new();
        child.add_route(noop_route("items", "list_items")).unwrap();
        child.add_route(noop_route("items/recent", "recent_items")).unwrap();
        child.attach_subapi("nested", inner).unwrap();

        let mut root = Api::new();
        root.add_route(noop_route("ping", "ping")).unwrap();
        root.attach_subapi("orders", child).unwrap();
        root
    }

    #[test]
    fn test_flatten_accumulates_base_paths() {
        let paths: Vec<String> = sample_tree()
            .flatten("/v1")
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(
            paths,
            vec![
                "/v1/ping",
                "/v1/orders/items",
                "/v1/orders/items/recent",
                "/v1/orders/nested/status",
            ]
        );
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let first: Vec<String> = sample_tree()
            .flatten("/v1")
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        let second: Vec<String> = sample_tree()
            .flatten("/v1")
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_add_route_after_flatten_is_sealed() {
        let mut api = Api::new();
        api.add_route(noop_route("ping", "ping")).unwrap();
        let _ = api.flatten("/v1").unwrap();
        let result = api.add_route(noop_route("pong", "pong"));
        assert!(matches!(result, Err(ConstructionError::Sealed)));
    }

    #[test]
    fn test_empty_attach_path_is_rejected() {
        let mut api = Api::new();
        let result = api.attach_subapi("", Api::new());
        assert!(matches!(result, Err(ConstructionError::EmptyAttachPath)));
        let result = api.attach_subapi("//", Api::new());
        assert!(matches!(result, Err(ConstructionError::EmptyAttachPath)));
    }

    #[test]
    fn test_duplicate_attach_path_is_rejected() {
        let mut api = Api::new();
        api.attach_subapi("orders", Api::new()).unwrap();
        let result = api.attach_subapi("/orders/", Api::new());
        assert!(matches!(result, Err(ConstructionError::DuplicateSubApi(_))));
    }

    #[test]
    fn test_duplicate_flattened_path_is_rejected() {
        let mut child = Api::new();
        child.add_route(noop_route("items", "a")).unwrap();
        let mut root = Api::new();
        root.add_route(noop_route("orders/items", "b")).unwrap();
        root.attach_subapi("orders", child).unwrap();
        let result = root.flatten("/v1");
        assert!(matches!(result, Err(ConstructionError::DuplicateRoute(_))));
    }

    #[test]
    fn test_iter_subapis_depth_bounds() {
        let tree = sample_tree();
        let direct = tree.iter_subapis(Some(0));
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].path(), "orders");

        let all = tree.iter_subapis(None);
        let paths: Vec<&str> = all.iter().map(|s| s.path()).collect();
        assert_eq!(paths, vec!["orders", "nested"]);
    }
}
