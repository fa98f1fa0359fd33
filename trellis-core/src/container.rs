// Service container used by the container-backed resolver

use crate::error::{Error, Result};
use crate::handler::Controller;
use crate::logging::{debug, trace};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Marker for anything that can live in the container.
pub trait Provider: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Provider for T {}

type ControllerBinding = Arc<dyn Fn(&Container) -> Result<Arc<dyn Controller>> + Send + Sync>;

/// Type-keyed services plus named controller bindings.
#[derive(Clone)]
pub struct Container {
    providers: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
    controllers: Arc<RwLock<HashMap<String, ControllerBinding>>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new service container");
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
            controllers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a service instance
    pub fn register<T: Provider>(&self, instance: T) {
        let type_name = std::any::type_name::<T>();

        trace!(provider = type_name, "Acquiring write lock for registration");
        self.providers
            .write()
            .insert(TypeId::of::<T>(), Arc::new(instance));

        debug!(provider = type_name, "Provider registered in container");
    }

    /// Register a service built by a factory
    pub fn register_factory<T: Provider, F>(&self, factory: F)
    where
        F: FnOnce() -> T,
    {
        debug!(
            provider = std::any::type_name::<T>(),
            "Creating provider from factory"
        );
        self.register(factory());
    }

    /// Resolve a service by type
    pub fn resolve<T: Provider>(&self) -> Result<Arc<T>> {
        let type_name = std::any::type_name::<T>();

        trace!(provider = type_name, "Attempting to resolve provider");
        let resolved = self
            .providers
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|any| any.clone().downcast::<T>().ok());

        match resolved {
            Some(instance) => {
                debug!(provider = type_name, "Provider resolved");
                Ok(instance)
            }
            None => {
                debug!(provider = type_name, "Provider not found in container");
                Err(Error::Resolution(type_name.to_string()))
            }
        }
    }

    pub fn has<T: Provider>(&self) -> bool {
        let exists = self.providers.read().contains_key(&TypeId::of::<T>());
        trace!(
            provider = std::any::type_name::<T>(),
            exists, "Checked provider existence"
        );
        exists
    }

    /// Bind a controller identifier to a factory.
    ///
    /// The factory runs on every [`Container::make`] and may resolve other
    /// services from the container.
    pub fn bind_controller<C, F>(&self, name: impl Into<String>, factory: F)
    where
        C: Controller + 'static,
        F: Fn(&Container) -> Result<C> + Send + Sync + 'static,
    {
        let name = name.into();
        let binding: ControllerBinding = Arc::new(move |container: &Container| {
            factory(container).map(|controller| Arc::new(controller) as Arc<dyn Controller>)
        });
        debug!(controller = %name, "Controller bound in container");
        self.controllers.write().insert(name, binding);
    }

    /// Build the controller bound to `name`.
    pub fn make(&self, name: &str) -> Result<Arc<dyn Controller>> {
        // Release the lock before running the factory; it may use the container.
        let binding = self.controllers.read().get(name).cloned();
        match binding {
            Some(binding) => {
                trace!(controller = name, "Making controller");
                binding(self)
            }
            None => Err(Error::Resolution(name.to_string())),
        }
    }

    pub fn has_controller(&self, name: &str) -> bool {
        self.controllers.read().contains_key(name)
    }

    /// Clear all services and bindings
    pub fn clear(&self) {
        let mut providers = self.providers.write();
        let count = providers.len();
        providers.clear();
        self.controllers.write().clear();

        debug!(provider_count = count, "Cleared container");
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut controllers: Vec<String> = self.controllers.read().keys().cloned().collect();
        controllers.sort();
        f.debug_struct("Container")
            .field("providers", &self.providers.read().len())
            .field("controllers", &controllers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ActionArgs, unknown_action};
    use crate::payload::Payload;

    struct Greeter {
        greeting: String,
    }

    struct GreetController {
        greeter: Arc<Greeter>,
    }

    impl Controller for GreetController {
        fn call_action(&self, action: &str, _args: ActionArgs) -> Result<Payload> {
            match action {
                "__invoke" => Ok(self.greeter.greeting.clone().into()),
                other => Err(unknown_action("GreetController", other)),
            }
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let container = Container::new();
        container.register(42u32);
        assert!(container.has::<u32>());
        assert_eq!(*container.resolve::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_resolve_missing() {
        let container = Container::new();
        assert!(matches!(container.resolve::<u64>(), Err(Error::Resolution(_))));
    }

    #[test]
    fn test_make_controller_with_dependency() {
        let container = Container::new();
        container.register(Greeter {
            greeting: "hello".into(),
        });
        container.bind_controller("GreetController", |c: &Container| {
            Ok(GreetController {
                greeter: c.resolve::<Greeter>()?,
            })
        });

        let controller = container.make("GreetController").unwrap();
        let payload = controller.call_action("__invoke", ActionArgs::default()).unwrap();
        assert!(matches!(payload, Payload::Content(_)));
        assert!(matches!(
            controller.call_action("nope", ActionArgs::default()),
            Err(Error::Invocation(_))
        ));
    }

    #[test]
    fn test_make_unknown_controller() {
        let container = Container::new();
        assert!(!container.has_controller("Missing"));
        assert!(matches!(container.make("Missing"), Err(Error::Resolution(_))));
    }

    #[test]
    fn test_clear() {
        let container = Container::new();
        container.register("value".to_string());
        container.clear();
        assert!(!container.has::<String>());
    }
}
