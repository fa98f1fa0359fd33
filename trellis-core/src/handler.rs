// Route handlers and the arguments they are invoked with
//
// A route handler is either a closure or a reference to a controller action
// written as "Identifier@method". The reference is parsed once, when the
// route is registered; resolution to an instance happens per dispatch in
// the resolver.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::request::Request;
use crate::routing::{CurrentRoute, RouteParams};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Method invoked when a controller reference names no action.
pub const DEFAULT_ACTION: &str = "__invoke";

/// Type-erased closure action.
pub type ActionFn = Arc<dyn Fn(ActionArgs) -> Result<Payload> + Send + Sync>;

/// A route handler.
#[derive(Clone)]
pub enum Handler {
    Closure(ActionFn),
    Controller(ControllerRef),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Closure(_) => f.write_str("Handler::Closure(..)"),
            Handler::Controller(reference) => write!(f, "Handler::Controller({reference})"),
        }
    }
}

/// A parsed `"Identifier@method"` controller reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerRef {
    pub type_name: String,
    pub method: String,
}

impl ControllerRef {
    /// Parse a reference. Without `@` the method is `__invoke`.
    pub fn parse(reference: &str) -> Result<Self> {
        let (type_name, method) = match reference.split_once('@') {
            Some((type_name, method)) => (type_name.trim(), method.trim()),
            None => (reference.trim(), DEFAULT_ACTION),
        };

        if type_name.is_empty() || method.is_empty() {
            return Err(Error::Route(format!(
                "invalid controller reference `{reference}`"
            )));
        }

        Ok(Self {
            type_name: type_name.to_string(),
            method: method.to_string(),
        })
    }
}

impl fmt::Display for ControllerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.type_name, self.method)
    }
}

impl FromStr for ControllerRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Conversion into a [`Handler`] at registration time.
///
/// The marker parameter keeps the closure and string impls from
/// overlapping.
pub trait IntoHandler<Marker> {
    fn into_handler(self) -> Result<Handler>;
}

impl<F, R> IntoHandler<(ActionArgs, R)> for F
where
    F: Fn(ActionArgs) -> Result<R> + Send + Sync + 'static,
    R: Into<Payload>,
{
    fn into_handler(self) -> Result<Handler> {
        Ok(action(self))
    }
}

impl IntoHandler<ControllerRef> for &str {
    fn into_handler(self) -> Result<Handler> {
        ControllerRef::parse(self).map(Handler::Controller)
    }
}

impl IntoHandler<ControllerRef> for String {
    fn into_handler(self) -> Result<Handler> {
        ControllerRef::parse(&self).map(Handler::Controller)
    }
}

impl IntoHandler<ControllerRef> for ControllerRef {
    fn into_handler(self) -> Result<Handler> {
        Ok(Handler::Controller(self))
    }
}

impl IntoHandler<Handler> for Handler {
    fn into_handler(self) -> Result<Handler> {
        Ok(self)
    }
}

/// Wrap a closure as a handler.
///
/// Use this where the closure's argument type cannot be inferred:
///
/// ```ignore
/// table.get("/foo/{bar}/{baz}", action(|args| {
///     Ok(format!("{}{}", args.require("bar")?, args.require("baz")?))
/// }))?;
/// ```
pub fn action<F, R>(f: F) -> Handler
where
    F: Fn(ActionArgs) -> Result<R> + Send + Sync + 'static,
    R: Into<Payload>,
{
    Handler::Closure(Arc::new(move |args| f(args).map(Into::into)))
}

/// A controller exposing named actions.
pub trait Controller: Send + Sync {
    /// Invoke `action`. Unknown actions return [`unknown_action`].
    fn call_action(&self, action: &str, args: ActionArgs) -> Result<Payload>;
}

/// The error a controller returns for an action it does not have.
pub fn unknown_action(controller: &str, action: &str) -> Error {
    Error::Invocation(format!("`{controller}` has no action `{action}`"))
}

/// Arguments handed to an action: the active request, if the resolver
/// delivers it, and the named path parameters.
#[derive(Clone, Default)]
pub struct ActionArgs {
    request: Option<Arc<Request>>,
    params: RouteParams,
    container: Option<Container>,
    input_fallback: bool,
}

impl ActionArgs {
    pub fn new(params: RouteParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn with_request(mut self, request: Arc<Request>) -> Self {
        self.request = Some(request);
        self
    }

    /// Attach a container. Named lookups then fall back to request input and
    /// services can be resolved by type.
    pub fn with_container(mut self, container: Container) -> Self {
        self.container = Some(container);
        self.input_fallback = true;
        self
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_deref()
    }

    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    /// A path parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// A path parameter by position.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.params.nth(index)
    }

    /// A named argument: the path parameter, or request input when a
    /// container-backed resolver supplied the arguments.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.params.get(name) {
            return Some(value.to_string());
        }
        if !self.input_fallback {
            return None;
        }
        self.request.as_ref().and_then(|request| request.input_str(name))
    }

    pub fn get_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    /// A named argument that must be present.
    pub fn require(&self, name: &str) -> Result<String> {
        self.get(name)
            .ok_or_else(|| Error::Invocation(format!("missing required parameter `{name}`")))
    }

    /// Resolve a service by type from the container.
    pub fn service<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        match &self.container {
            Some(container) => container.resolve::<T>(),
            None => Err(Error::Resolution(std::any::type_name::<T>().to_string())),
        }
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    /// The route matched for the active request.
    pub fn route(&self) -> Option<Arc<CurrentRoute>> {
        self.request.as_ref().and_then(|request| request.route())
    }
}

impl fmt::Debug for ActionArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionArgs")
            .field("request", &self.request)
            .field("params", &self.params)
            .field("has_container", &self.container.is_some())
            .field("input_fallback", &self.input_fallback)
            .finish()
    }
}
