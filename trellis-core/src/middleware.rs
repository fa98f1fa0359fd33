// Middleware wrapping the final action invocation

use crate::error::Result;
use crate::logging::{debug, trace};
use crate::request::Request;
use crate::response::Response;
use std::sync::Arc;

/// The rest of the chain, ending in the matched action.
pub type Next<'a> = &'a dyn Fn(&Request) -> Result<Response>;

/// Middleware sees the request before the action runs and the normalized
/// response after it returns.
pub trait Middleware: Send + Sync {
    fn handle(&self, request: &Request, next: Next<'_>) -> Result<Response>;
}

/// Ordered middleware; the first registered runs outermost.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        let mut mws = (*self.middlewares).clone();
        mws.push(Arc::new(middleware));
        self.middlewares = Arc::new(mws);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run the chain around `handler`.
    pub fn apply(&self, request: &Request, handler: Next<'_>) -> Result<Response> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %request.path(),
            method = %request.method(),
            "Executing middleware chain"
        );
        self.execute_from(0, request, handler)
    }

    fn execute_from(&self, index: usize, request: &Request, handler: Next<'_>) -> Result<Response> {
        match self.middlewares.get(index) {
            None => {
                trace!("Middleware chain complete, calling handler");
                handler(request)
            }
            Some(middleware) => {
                trace!(middleware_index = index, "Executing middleware");
                let next = |request: &Request| self.execute_from(index + 1, request, handler);
                middleware.handle(request, &next)
            }
        }
    }
}

/// Middleware built from a closure.
pub struct FnMiddleware<F> {
    f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&Request, Next<'_>) -> Result<Response> + Send + Sync,
{
    fn handle(&self, request: &Request, next: Next<'_>) -> Result<Response> {
        (self.f)(request, next)
    }
}

/// Wrap a closure as middleware.
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&Request, Next<'_>) -> Result<Response> + Send + Sync,
{
    FnMiddleware { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use parking_lot::Mutex;

    #[test]
    fn test_empty_chain_calls_handler() {
        let chain = MiddlewareChain::new();
        let request = Request::create("/", "GET");
        let response = chain.apply(&request, &|_| Ok(Response::text("done"))).unwrap();
        assert_eq!(response.content(), "done");
    }

    #[test]
    fn test_first_registered_runs_outermost() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        for name in ["outer", "inner"] {
            let order = Arc::clone(&order);
            chain.use_middleware(from_fn(move |request: &Request, next: Next<'_>| {
                order.lock().push(format!("{name}:before"));
                let response = next(request);
                order.lock().push(format!("{name}:after"));
                response
            }));
        }

        let request = Request::create("/", "GET");
        chain.apply(&request, &|_| Ok(Response::ok())).unwrap();
        assert_eq!(
            *order.lock(),
            vec!["outer:before", "inner:before", "inner:after", "outer:after"]
        );
    }

    #[test]
    fn test_middleware_can_rewrite_response() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(from_fn(|request: &Request, next: Next<'_>| {
            let response = next(request)?;
            Ok(response
                .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                .with_text("Middleware"))
        }));

        let request = Request::create("/", "GET");
        let response = chain.apply(&request, &|_| Ok(Response::text("handler"))).unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.content(), "Middleware");
    }
}
