// HTTP/1 server adapter over tokio and hyper

use crate::error::Result;
use crate::kernel::Kernel;
use crate::logging::{debug, error, info};
use crate::request::Request;
use crate::responder::GENERIC_MESSAGE;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming as IncomingBody};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Serves a shared [`Kernel`] over HTTP/1.1.
///
/// Dispatch is synchronous, so each request runs on the blocking pool with
/// its own dispatch context.
#[derive(Debug, Clone)]
pub struct Server {
    kernel: Arc<Kernel>,
}

impl Server {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Bind `addr` and serve until the task is dropped.
    pub async fn listen(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections accepted from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "Server listening");

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let kernel = Arc::clone(&self.kernel);

            tokio::spawn(async move {
                let service = service_fn(move |mut req: http::Request<IncomingBody>| {
                    req.extensions_mut().insert(peer);
                    let kernel = Arc::clone(&kernel);
                    async move { handle_request(req, kernel).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer, error = %err, "Error serving connection");
                }
            });
        }
    }
}

/// Convert a hyper request, dispatch it and convert the response back.
pub async fn handle_request<B>(
    req: http::Request<B>,
    kernel: Arc<Kernel>,
) -> std::result::Result<http::Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            debug!(error = %err, "Failed to read request body");
            return Ok(plain(StatusCode::BAD_REQUEST, "Bad Request"));
        }
    };

    let request = Request::from_http(parts, body);
    let dispatched = tokio::task::spawn_blocking(move || kernel.dispatch(request)).await;

    let response = match dispatched {
        Ok(Ok(response)) => response.into_http().map(Full::new),
        Ok(Err(fault)) => {
            error!(error = %fault, kind = fault.kind(), "Fault escaped dispatch");
            plain(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_MESSAGE)
        }
        Err(join) => {
            error!(error = %join, "Dispatch task failed");
            plain(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_MESSAGE)
        }
    };
    Ok(response)
}

fn plain(status: StatusCode, message: &'static str) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}
