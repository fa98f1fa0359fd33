// Route matching for the dispatch kernel

use crate::error::{Error, Result};
use crate::handler::{Handler, IntoHandler};
use crate::logging::{debug, trace};
use crate::request::RouteResolver;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Ordered path parameters extracted from a matched route.
///
/// Most routes carry few parameters, so they are kept inline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(SmallVec<[(String, String); 4]>);

impl RouteParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Value at a position, in match order.
    pub fn nth(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for RouteParams {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut params = RouteParams::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Outcome of matching a method and path against a route table.
#[derive(Debug, Clone)]
pub enum RouteMatch {
    NotFound,
    MethodNotAllowed { allowed: Vec<String> },
    Found { handler: Handler, params: RouteParams },
}

/// Anything that can match requests to handlers.
pub trait RouteMatcher: Send + Sync {
    /// Match a method against an already normalized path.
    fn dispatch(&self, method: &str, path: &str) -> RouteMatch;
}

/// Trim surrounding slashes and enforce a single leading slash.
///
/// `"//foo/"` becomes `"/foo"` and `""` becomes `"/"`.
pub fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// The route matched for one dispatch.
#[derive(Debug, Clone)]
pub struct CurrentRoute {
    pub method: String,
    pub path: String,
    pub handler: Handler,
    pub params: RouteParams,
}

/// Per-dispatch state. Dropped when dispatch returns.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    route: Arc<CurrentRoute>,
}

impl DispatchContext {
    pub fn new(route: CurrentRoute) -> Self {
        Self {
            route: Arc::new(route),
        }
    }

    pub fn route(&self) -> &Arc<CurrentRoute> {
        &self.route
    }

    /// A resolver that hands out this context's route.
    pub fn route_resolver(&self) -> RouteResolver {
        let route = Arc::clone(&self.route);
        Arc::new(move || Some(Arc::clone(&route)))
    }
}

/// Method lists accepted by route registration.
pub trait IntoMethods {
    fn into_methods(self) -> Vec<String>;
}

impl IntoMethods for &str {
    fn into_methods(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoMethods for String {
    fn into_methods(self) -> Vec<String> {
        vec![self]
    }
}

impl<const N: usize> IntoMethods for [&str; N] {
    fn into_methods(self) -> Vec<String> {
        self.iter().map(|m| m.to_string()).collect()
    }
}

impl IntoMethods for &[&str] {
    fn into_methods(self) -> Vec<String> {
        self.iter().map(|m| m.to_string()).collect()
    }
}

impl IntoMethods for Vec<String> {
    fn into_methods(self) -> Vec<String> {
        self
    }
}

#[derive(Debug)]
struct RouteEntry {
    pattern: String,
    methods: Vec<(String, Handler)>,
}

/// Default matcher: a radix tree of path patterns, each with handlers keyed
/// by method in registration order.
///
/// Patterns use `{name}` segments and `{*rest}` catch-alls.
pub struct RouteTable {
    tree: matchit::Router<usize>,
    entries: Vec<RouteEntry>,
    patterns: HashMap<String, usize>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("entries", &self.entries)
            .finish()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            tree: matchit::Router::new(),
            entries: Vec::new(),
            patterns: HashMap::new(),
        }
    }

    /// Register a handler for one or more methods on a pattern.
    pub fn add_route<M, H>(
        &mut self,
        methods: impl IntoMethods,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self>
    where
        H: IntoHandler<M>,
    {
        let mut methods: Vec<String> = methods
            .into_methods()
            .into_iter()
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        // Keep the first occurrence of each method, in the order given.
        let mut seen = HashSet::with_capacity(methods.len());
        methods.retain(|m| seen.insert(m.clone()));
        if methods.is_empty() {
            return Err(Error::Route(format!("no methods given for `{pattern}`")));
        }

        let pattern = normalize_path(pattern);
        validate_pattern(&pattern)?;
        let handler = handler.into_handler()?;

        let index = match self.patterns.get(&pattern) {
            Some(index) => *index,
            None => {
                let index = self.entries.len();
                self.tree
                    .insert(pattern.clone(), index)
                    .map_err(|e| Error::Route(format!("`{pattern}`: {e}")))?;
                self.entries.push(RouteEntry {
                    pattern: pattern.clone(),
                    methods: Vec::new(),
                });
                self.patterns.insert(pattern.clone(), index);
                index
            }
        };

        let entry = &mut self.entries[index];
        if let Some(method) = methods
            .iter()
            .find(|method| entry.methods.iter().any(|(m, _)| m == *method))
        {
            return Err(Error::Route(format!(
                "`{method} {}` is already registered",
                entry.pattern
            )));
        }
        for method in methods {
            debug!(method = %method, pattern = %entry.pattern, "Registered route");
            entry.methods.push((method, handler.clone()));
        }

        Ok(self)
    }

    pub fn get<M>(&mut self, pattern: &str, handler: impl IntoHandler<M>) -> Result<&mut Self> {
        self.add_route("GET", pattern, handler)
    }

    pub fn post<M>(&mut self, pattern: &str, handler: impl IntoHandler<M>) -> Result<&mut Self> {
        self.add_route("POST", pattern, handler)
    }

    pub fn put<M>(&mut self, pattern: &str, handler: impl IntoHandler<M>) -> Result<&mut Self> {
        self.add_route("PUT", pattern, handler)
    }

    pub fn patch<M>(&mut self, pattern: &str, handler: impl IntoHandler<M>) -> Result<&mut Self> {
        self.add_route("PATCH", pattern, handler)
    }

    pub fn delete<M>(&mut self, pattern: &str, handler: impl IntoHandler<M>) -> Result<&mut Self> {
        self.add_route("DELETE", pattern, handler)
    }

    pub fn options<M>(&mut self, pattern: &str, handler: impl IntoHandler<M>) -> Result<&mut Self> {
        self.add_route("OPTIONS", pattern, handler)
    }

    /// Number of (method, pattern) registrations.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.methods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RouteMatcher for RouteTable {
    fn dispatch(&self, method: &str, path: &str) -> RouteMatch {
        let matched = match self.tree.at(path) {
            Ok(matched) => matched,
            Err(_) => {
                trace!(method, path, "No route pattern matched");
                return RouteMatch::NotFound;
            }
        };

        let entry = &self.entries[*matched.value];
        let lookup = |wanted: &str| {
            entry
                .methods
                .iter()
                .find(|(m, _)| m.eq_ignore_ascii_case(wanted))
                .map(|(_, h)| h.clone())
        };

        let handler = lookup(method).or_else(|| {
            if method.eq_ignore_ascii_case("HEAD") {
                lookup("GET")
            } else {
                None
            }
        });

        match handler {
            Some(handler) => RouteMatch::Found {
                handler,
                params: matched.params.iter().collect(),
            },
            None => RouteMatch::MethodNotAllowed {
                allowed: entry.methods.iter().map(|(m, _)| m.clone()).collect(),
            },
        }
    }
}

fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.contains('[') || pattern.contains(']') {
        return Err(Error::Route(format!(
            "`{pattern}`: optional segments are not supported"
        )));
    }
    let mut rest = pattern;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            return Err(Error::Route(format!("`{pattern}`: unclosed parameter")));
        };
        let name = &rest[start + 1..start + len];
        if name.contains(':') {
            return Err(Error::Route(format!(
                "`{pattern}`: parameter constraints are not supported"
            )));
        }
        rest = &rest[start + len + 1..];
    }
    Ok(())
}
