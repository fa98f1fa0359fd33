//! The dispatch kernel.
//!
//! [`Kernel::dispatch`] takes a request through matching, resolution and
//! normalization. Any fault along the way, panics included, is handed to
//! the [`ErrorResponder`]:
//!
//! ```text
//! Start -> Matching -> Resolving -> Normalizing -> Done
//!              \            \            \
//!               `------------`------------`--> Erred -> Responded
//! ```
//!
//! A kernel holds no per-request state, so one instance can serve many
//! threads behind an `Arc`.

use crate::config::KernelConfig;
use crate::emitter::Emitter;
use crate::error::{Error, Result};
use crate::handler::{ActionArgs, Handler};
use crate::http_error::HttpError;
use crate::logging::{Logger, TracingLogger, debug, error};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::normalizer::ResponseNormalizer;
use crate::request::Request;
use crate::resolver::{Resolver, SimpleResolver};
use crate::responder::{DiagnosticRenderer, ErrorResponder};
use crate::response::Response;
use crate::routing::{
    CurrentRoute, DispatchContext, RouteMatch, RouteMatcher, RouteTable, normalize_path,
};
use std::any::Any;
use std::fmt;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

pub struct Kernel {
    routes: RouteTable,
    matcher: Option<Arc<dyn RouteMatcher>>,
    resolver: Arc<dyn Resolver>,
    responder: ErrorResponder,
    normalizer: ResponseNormalizer,
    middleware: MiddlewareChain,
    request_uri: Option<String>,
    emitter: Emitter,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// A kernel with an empty route table and a [`SimpleResolver`].
    pub fn new() -> Self {
        Self::with_resolver(SimpleResolver::default())
    }

    pub fn with_resolver<R: Resolver + 'static>(resolver: R) -> Self {
        Self {
            routes: RouteTable::new(),
            matcher: None,
            resolver: Arc::new(resolver),
            responder: ErrorResponder::new(),
            normalizer: ResponseNormalizer::default(),
            middleware: MiddlewareChain::new(),
            request_uri: None,
            emitter: Emitter::default(),
        }
    }

    pub fn with_config(mut self, config: &KernelConfig) -> Self {
        self.apply_config(config);
        self
    }

    pub fn apply_config(&mut self, config: &KernelConfig) {
        self.responder.set_debug(config.debug);
        self.request_uri = config.request_uri.clone();
        self.normalizer.set_json_options(config.json_options());
        self.emitter = self.emitter.clone().with_charset(config.charset.clone());
        if config.log_faults {
            self.responder.set_logger(Some(Arc::new(TracingLogger)));
        }
    }

    pub fn set_resolver<R: Resolver + 'static>(&mut self, resolver: R) -> &mut Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn set_logger<L: Logger + 'static>(&mut self, logger: L) -> &mut Self {
        self.responder.set_logger(Some(Arc::new(logger)));
        self
    }

    pub fn clear_logger(&mut self) -> &mut Self {
        self.responder.set_logger(None);
        self
    }

    /// Replace the built-in route table with another matcher.
    pub fn use_matcher<M: RouteMatcher + 'static>(&mut self, matcher: M) -> &mut Self {
        self.matcher = Some(Arc::new(matcher));
        self
    }

    /// Dispatch this path instead of the request's own.
    pub fn use_request_uri(&mut self, uri: Option<String>) -> &mut Self {
        self.request_uri = uri;
        self
    }

    /// Register routes on the built-in route table.
    pub fn router<F>(&mut self, register: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut RouteTable) -> Result<()>,
    {
        register(&mut self.routes)?;
        Ok(self)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middleware.use_middleware(middleware);
        self
    }

    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.responder.set_debug(debug);
        self
    }

    pub fn is_debug(&self) -> bool {
        self.responder.is_debug()
    }

    pub fn set_diagnostic_renderer(
        &mut self,
        renderer: Option<Arc<dyn DiagnosticRenderer>>,
    ) -> &mut Self {
        self.responder.set_renderer(renderer);
        self
    }

    pub fn set_emitter(&mut self, emitter: Emitter) -> &mut Self {
        self.emitter = emitter;
        self
    }

    /// Dispatch a request to its handler and return the response.
    ///
    /// Faults become error responses. The only `Err` is a fault re-raised
    /// by debug mode without a diagnostic renderer.
    pub fn dispatch(&self, request: Request) -> Result<Response> {
        let fault = match catch_unwind(AssertUnwindSafe(|| self.run(request))) {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(fault)) => fault,
            Err(panic) => Error::Panic(panic_message(panic.as_ref())),
        };

        debug!(kind = fault.kind(), "Dispatch failed");
        self.responder.respond(fault)
    }

    fn run(&self, mut request: Request) -> Result<Response> {
        let path = normalize_path(self.request_uri.as_deref().unwrap_or(request.path()));
        let method = request.method().to_string();
        debug!(method = %method, path = %path, "Dispatching request");

        let matched = match &self.matcher {
            Some(matcher) => matcher.dispatch(&method, &path),
            None => self.routes.dispatch(&method, &path),
        };

        match matched {
            RouteMatch::NotFound => Err(HttpError::not_found().into()),
            RouteMatch::MethodNotAllowed { allowed } => {
                Err(HttpError::method_not_allowed(allowed).into())
            }
            RouteMatch::Found { handler, params } => {
                let context = DispatchContext::new(CurrentRoute {
                    method,
                    path,
                    handler,
                    params,
                });
                request.set_route_resolver(context.route_resolver());
                let request = Arc::new(request);

                let invoke = |_: &Request| self.invoke(&request);
                self.middleware.apply(&request, &invoke)
            }
        }
    }

    fn invoke(&self, request: &Arc<Request>) -> Result<Response> {
        let route = request
            .route()
            .ok_or_else(|| Error::Invocation("request has no matched route".to_string()))?;

        let mut args = ActionArgs::new(route.params.clone());
        if self.resolver.accepts_request() {
            args = args.with_request(Arc::clone(request));
        }

        let payload = match &route.handler {
            Handler::Closure(action) => self.resolver.call(action, args)?,
            Handler::Controller(reference) => self.resolver.call_controller(reference, args)?,
        };
        self.normalizer.normalize(payload)
    }

    /// Dispatch and write the response to `out`.
    pub fn handle_to<W: Write>(&self, request: Request, out: &mut W) -> Result<()> {
        let response = self.dispatch(request)?;
        self.emitter.emit(&response, out)
    }

    /// Dispatch, write the response to stdout and exit the process.
    pub fn handle(&self, request: Request) -> ! {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        match self.handle_to(request, &mut out) {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                error!(error = %e, kind = e.kind(), "Unable to handle request");
                std::process::exit(1)
            }
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("routes", &self.routes.len())
            .field("custom_matcher", &self.matcher.is_some())
            .field("responder", &self.responder)
            .field("middleware", &self.middleware.len())
            .field("request_uri", &self.request_uri)
            .field("emitter", &self.emitter)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::action;
    use crate::responder::GENERIC_MESSAGE;
    use http::StatusCode;

    #[test]
    fn test_panic_becomes_500() {
        let mut kernel = Kernel::new();
        kernel
            .router(|r| {
                r.get("/boom", action(|_| -> Result<&'static str> { panic!("handler blew up") }))?;
                Ok(())
            })
            .unwrap();

        let response = kernel.dispatch(Request::create("/boom", "GET")).unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.content(), GENERIC_MESSAGE);
    }

    #[test]
    fn test_panic_reraised_in_debug_without_renderer() {
        let mut kernel = Kernel::new();
        kernel
            .router(|r| {
                r.get("/boom", action(|_| -> Result<()> { panic!("handler blew up") }))?;
                Ok(())
            })
            .unwrap();
        kernel.set_debug(true).set_diagnostic_renderer(None);

        match kernel.dispatch(Request::create("/boom", "GET")) {
            Err(Error::Panic(message)) => assert_eq!(message, "handler blew up"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_request_uri_override() {
        let mut kernel = Kernel::new();
        kernel
            .router(|r| {
                r.get("/real", action(|_| Ok("real")))?;
                Ok(())
            })
            .unwrap();
        kernel.use_request_uri(Some("real/".to_string()));

        let response = kernel.dispatch(Request::create("/ignored", "GET")).unwrap();
        assert_eq!(response.content(), "real");
    }
}
