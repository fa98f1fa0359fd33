// Error types for the trellis kernel

use crate::http_error::{HttpError, HttpFault};
use http::{HeaderMap, StatusCode};
use thiserror::Error;

/// Result alias used throughout the kernel.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// A fault that declares its own HTTP status and headers.
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Unable to resolve `{0}`")]
    Resolution(String),

    #[error("Invocation failed: {0}")]
    Invocation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Route registration error: {0}")]
    Route(String),

    #[error("Invalid HTTP status code: {0}")]
    InvalidStatus(u16),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A handler (or anything it called) panicked.
    #[error("Handler panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary application error.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Other(error.into())
    }

    /// The HTTP-error capability of this fault, if it has one.
    ///
    /// Application errors boxed into [`Error::Other`] still count when they
    /// are an [`HttpError`].
    pub fn as_http_fault(&self) -> Option<&dyn HttpFault> {
        match self {
            Error::Http(e) => Some(e),
            Error::Other(e) => e.downcast_ref::<HttpError>().map(|e| e as &dyn HttpFault),
            _ => None,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        self.as_http_fault()
            .map(|fault| fault.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Headers the fault wants on its response.
    pub fn headers(&self) -> HeaderMap {
        self.as_http_fault()
            .map(|fault| fault.headers().clone())
            .unwrap_or_default()
    }

    /// Short, stable name of the fault kind, used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Http(_) => "http",
            Error::Resolution(_) => "resolution",
            Error::Invocation(_) => "invocation",
            Error::Serialization(_) => "serialization",
            Error::Deserialization(_) => "deserialization",
            Error::Route(_) => "route",
            Error::InvalidStatus(_) => "invalid_status",
            Error::InvalidHeader(_) => "invalid_header",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Panic(_) => "panic",
            Error::Other(_) if self.as_http_fault().is_some() => "http",
            Error::Other(_) => "other",
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}
