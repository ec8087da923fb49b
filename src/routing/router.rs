//! Priority ordered route table.

use http::Method;
use indexmap::IndexMap;

use crate::routing::matcher::RoutePattern;

/// One routable entry.
#[derive(Debug, Clone)]
pub struct Route<T> {
    pub pattern: RoutePattern,
    /// Accepted methods; empty accepts any.
    pub methods: Vec<Method>,
    pub priority: u32,
    pub target: T,
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a, T> {
    pub target: &'a T,
    pub params: IndexMap<String, String>,
}

/// Why a lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMiss {
    NotFound,
    /// The path matched but no route accepts the method.
    MethodNotAllowed,
}

/// Immutable route table; first match by descending priority wins.
#[derive(Debug, Clone)]
pub struct Router<T> {
    routes: Vec<Route<T>>,
}

impl<T> Router<T> {
    pub fn new(mut routes: Vec<Route<T>>) -> Self {
        // Stable sort keeps configuration order among equal priorities.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { routes }
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Result<RouteMatch<'_, T>, RouteMiss> {
        let mut path_matched = false;
        for route in &self.routes {
            let Some(params) = route.pattern.matches(path) else {
                continue;
            };
            if route.methods.is_empty() || route.methods.contains(method) {
                return Ok(RouteMatch {
                    target: &route.target,
                    params,
                });
            }
            path_matched = true;
        }

        if path_matched {
            Err(RouteMiss::MethodNotAllowed)
        } else {
            Err(RouteMiss::NotFound)
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}
