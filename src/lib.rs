// Trellis - a request-dispatch kernel for Rust
//
// Routes a request to an action, resolves and invokes it, normalizes whatever
// it returns into a response, and renders faults as error responses.

// Re-export core functionality
pub use trellis_core::*;

#[cfg(feature = "testing")]
pub use trellis_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ActionArgs, Container, ContainerResolver, Content, Controller, ControllerRef, Error,
        ErrorResponder, Handler, HttpError, JsonBody, Kernel, KernelConfig, Middleware, Payload,
        Request, Resolver, Response, Result, RouteTable, Server, SimpleResolver, SoftError,
        action,
    };
}
