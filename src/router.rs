//! Route table lookup.
//!
//! The router owns the flattened route table in its deterministic flatten
//! order (the order the external HTTP server sees) plus an exact-match index
//! for dispatch. Paths are literal after `{name}` substitution, so lookup is
//! a plain map probe.

use std::collections::HashMap;

use crate::api::Route;

pub struct Router {
    table: Vec<Route>,
    index: HashMap<String, usize>,
}

impl Router {
    /// Build a router from an already-validated route table (flattening
    /// guarantees path uniqueness).
    #[must_use]
    pub fn new(table: Vec<Route>) -> Self {
        let index = table
            .iter()
            .enumerate()
            .map(|(idx, route)| (route.path.clone(), idx))
            .collect();
        Self { table, index }
    }

    /// Look up the route registered at an exact path.
    #[must_use]
    pub fn route(&self, path: &str) -> Option<&Route> {
        self.index.get(path).map(|&idx| &self.table[idx])
    }

    /// The route table in flatten order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.table
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
