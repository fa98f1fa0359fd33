//! Action resolution.
//!
//! A [`Resolver`] invokes a matched handler. Closures are called directly;
//! controller references are first turned into an instance by the
//! resolver's make strategy and then asked to run the named action.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::handler::{ActionArgs, ActionFn, Controller, ControllerRef};
use crate::logging::{debug, trace};
use crate::payload::Payload;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Invokes handlers on behalf of the kernel.
pub trait Resolver: Send + Sync {
    /// Call a closure action.
    fn call(&self, action: &ActionFn, args: ActionArgs) -> Result<Payload>;

    /// Instantiate the referenced controller and call its action.
    fn call_controller(&self, reference: &ControllerRef, args: ActionArgs) -> Result<Payload>;

    /// Whether the active request should be delivered to actions.
    fn accepts_request(&self) -> bool {
        true
    }
}

/// Builds controller instances from an identifier.
pub trait ControllerFactory: Send + Sync {
    fn make(&self, type_name: &str) -> Result<Arc<dyn Controller>>;
}

type Constructor = Arc<dyn Fn() -> Arc<dyn Controller> + Send + Sync>;

/// Plain instantiation: identifiers map to constructors.
///
/// Every lookup builds a fresh instance.
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller constructed through `Default`.
    pub fn register<C>(&mut self, name: impl Into<String>) -> &mut Self
    where
        C: Controller + Default + 'static,
    {
        self.register_with(name, C::default)
    }

    /// Register a controller built by a constructor function.
    pub fn register_with<C, F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        C: Controller + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(controller = %name, "Registered controller");
        self.constructors.insert(
            name,
            Arc::new(move || Arc::new(constructor()) as Arc<dyn Controller>),
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

impl ControllerFactory for ControllerRegistry {
    fn make(&self, type_name: &str) -> Result<Arc<dyn Controller>> {
        self.constructors
            .get(type_name)
            .map(|construct| construct())
            .ok_or_else(|| Error::Resolution(type_name.to_string()))
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("ControllerRegistry")
            .field("controllers", &names)
            .finish()
    }
}

/// Calls actions with the request and path parameters, instantiating
/// controllers from a registry.
#[derive(Debug, Clone)]
pub struct SimpleResolver {
    registry: ControllerRegistry,
    pass_request: bool,
}

impl SimpleResolver {
    pub fn new(registry: ControllerRegistry) -> Self {
        Self {
            registry,
            pass_request: true,
        }
    }

    pub fn registry_mut(&mut self) -> &mut ControllerRegistry {
        &mut self.registry
    }

    /// Do not deliver the request to actions; they only see path parameters.
    pub fn without_request(mut self) -> Self {
        self.pass_request = false;
        self
    }
}

impl Default for SimpleResolver {
    fn default() -> Self {
        Self::new(ControllerRegistry::new())
    }
}

impl Resolver for SimpleResolver {
    fn call(&self, action: &ActionFn, args: ActionArgs) -> Result<Payload> {
        action(args)
    }

    fn call_controller(&self, reference: &ControllerRef, args: ActionArgs) -> Result<Payload> {
        trace!(controller = %reference, "Resolving controller from registry");
        let controller = self.registry.make(&reference.type_name)?;
        controller.call_action(&reference.method, args)
    }

    fn accepts_request(&self) -> bool {
        self.pass_request
    }
}

/// Resolves controllers through the container and lets actions pull named
/// arguments from request input and services by type.
#[derive(Debug, Clone, Default)]
pub struct ContainerResolver {
    container: Container,
}

impl ContainerResolver {
    pub fn new(container: Container) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }
}

impl ControllerFactory for ContainerResolver {
    fn make(&self, type_name: &str) -> Result<Arc<dyn Controller>> {
        self.container.make(type_name)
    }
}

impl Resolver for ContainerResolver {
    fn call(&self, action: &ActionFn, args: ActionArgs) -> Result<Payload> {
        action(args.with_container(self.container.clone()))
    }

    fn call_controller(&self, reference: &ControllerRef, args: ActionArgs) -> Result<Payload> {
        trace!(controller = %reference, "Resolving controller from container");
        let controller = self.make(&reference.type_name)?;
        controller.call_action(&reference.method, args.with_container(self.container.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Handler, action, unknown_action};
    use crate::payload::Content;
    use crate::routing::RouteParams;

    #[derive(Default)]
    struct ShowController;

    impl Controller for ShowController {
        fn call_action(&self, action: &str, args: ActionArgs) -> Result<Payload> {
            match action {
                "show" => Ok(format!("show {}", args.require("id")?).into()),
                "__invoke" => Ok("invoked".into()),
                other => Err(unknown_action("ShowController", other)),
            }
        }
    }

    fn text(payload: Payload) -> String {
        match payload {
            Payload::Content(Content::Text(text)) => text,
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    fn args(id: &str) -> ActionArgs {
        ActionArgs::new([("id", id)].into_iter().collect::<RouteParams>())
    }

    #[test]
    fn test_simple_resolver_calls_named_action() {
        let mut registry = ControllerRegistry::new();
        registry.register::<ShowController>("ShowController");
        let resolver = SimpleResolver::new(registry);

        let show = ControllerRef::parse("ShowController@show").unwrap();
        assert_eq!(text(resolver.call_controller(&show, args("7")).unwrap()), "show 7");

        let invoke = ControllerRef::parse("ShowController").unwrap();
        assert_eq!(text(resolver.call_controller(&invoke, args("7")).unwrap()), "invoked");
    }

    #[test]
    fn test_unknown_controller_is_resolution_error() {
        let resolver = SimpleResolver::default();
        let reference = ControllerRef::parse("Missing@show").unwrap();
        assert!(matches!(
            resolver.call_controller(&reference, args("1")),
            Err(Error::Resolution(_))
        ));
    }

    #[test]
    fn test_unknown_action_is_invocation_error() {
        let mut registry = ControllerRegistry::new();
        registry.register::<ShowController>("ShowController");
        let resolver = SimpleResolver::new(registry);
        let reference = ControllerRef::parse("ShowController@destroy").unwrap();
        assert!(matches!(
            resolver.call_controller(&reference, args("1")),
            Err(Error::Invocation(_))
        ));
    }

    #[test]
    fn test_without_request() {
        assert!(SimpleResolver::default().accepts_request());
        assert!(!SimpleResolver::default().without_request().accepts_request());
    }

    #[test]
    fn test_container_resolver_injects_services() {
        let container = Container::new();
        container.register(String::from("injected"));
        let resolver = ContainerResolver::new(container);

        let Handler::Closure(f) = action(|args| Ok(args.service::<String>()?.to_string())) else {
            panic!("expected closure");
        };
        assert_eq!(text(resolver.call(&f, ActionArgs::default()).unwrap()), "injected");
    }
}
