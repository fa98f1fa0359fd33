// Core library for the trellis HTTP kernel
// This module contains the request/response values, route matching,
// action resolution and the dispatch kernel

pub mod config;
pub mod container;
pub mod emitter;
pub mod error;
pub mod handler;
pub mod http_error;
mod json_capture;
pub mod kernel;
pub mod logging;
pub mod middleware;
pub mod normalizer;
pub mod payload;
pub mod request;
pub mod resolver;
pub mod responder;
pub mod response;
pub mod routing;
pub mod server;

// Re-export commonly used types
pub use config::*;
pub use container::*;
pub use emitter::*;
pub use error::*;
pub use handler::*;
pub use http_error::*;
pub use kernel::*;
pub use logging::{FaultRecord, LogError, Logger, TracingLogger};
pub use middleware::*;
pub use normalizer::*;
pub use payload::*;
pub use request::*;
pub use resolver::*;
pub use responder::*;
pub use response::*;
pub use routing::*;
pub use server::Server;

pub use http::{HeaderMap, StatusCode};
