//! Declared HTTP errors.
//!
//! An [`HttpError`] is raised at the failure site (a handler, the kernel's
//! matching step) and carries everything the error responder needs to build
//! the response: the status, a human readable message and any headers that
//! belong on the reply, such as `Allow` for a 405.

use crate::error::{Error, Result};
use http::header::{ALLOW, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use std::fmt;
use thiserror::Error;

/// The HTTP-error capability: a fault that knows its own status and headers.
pub trait HttpFault: std::error::Error + Send + Sync {
    fn status_code(&self) -> StatusCode;

    fn headers(&self) -> &HeaderMap;
}

/// A fault with a declared HTTP status.
#[derive(Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HttpError {
    /// Create an error with an explicit status code.
    ///
    /// Codes outside 100-599 are rejected with [`Error::InvalidStatus`].
    pub fn new(status: u16, message: impl Into<String>) -> Result<Self> {
        if !(100..=599).contains(&status) {
            return Err(Error::InvalidStatus(status));
        }
        let status = StatusCode::from_u16(status).map_err(|_| Error::InvalidStatus(status))?;
        Ok(Self::from_status(status, message))
    }

    pub(crate) fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: HeaderMap::new(),
            source: None,
        }
    }

    /// 405 with the `Allow` header listing the permitted methods.
    pub fn method_not_allowed<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allow = allowed
            .into_iter()
            .map(|m| m.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let error = Self::from_status(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        match HeaderValue::from_str(&allow) {
            Ok(value) => error.with_header(ALLOW, value),
            Err(_) => error,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl HttpFault for HttpError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status.as_u16())
            .field("message", &self.message)
            .field("headers", &self.headers)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

macro_rules! declare_http_errors {
    ($($(#[$doc:meta])* $name:ident => ($status:ident, $message:literal);)*) => {
        impl HttpError {
            $(
                $(#[$doc])*
                pub fn $name() -> Self {
                    Self::from_status(StatusCode::$status, $message)
                }
            )*
        }
    };
}

declare_http_errors! {
    bad_request => (BAD_REQUEST, "Bad Request");
    unauthorized => (UNAUTHORIZED, "Unauthorized");
    forbidden => (FORBIDDEN, "Forbidden");
    /// 403 for a denied permission check.
    access_denied => (FORBIDDEN, "Access Denied");
    not_found => (NOT_FOUND, "Not Found");
    not_acceptable => (NOT_ACCEPTABLE, "Not Acceptable");
    conflict => (CONFLICT, "Conflict");
    gone => (GONE, "Gone");
    length_required => (LENGTH_REQUIRED, "Length Required");
    precondition_failed => (PRECONDITION_FAILED, "Precondition Failed");
    unsupported_media => (UNSUPPORTED_MEDIA_TYPE, "Unsupported Media");
    expectation_failed => (EXPECTATION_FAILED, "Expectation Failed");
    unprocessable_entity => (UNPROCESSABLE_ENTITY, "Unprocessable Entity");
    precondition_required => (PRECONDITION_REQUIRED, "Precondition Required");
    too_many_requests => (TOO_MANY_REQUESTS, "Too Many Requests");
    unavailable_for_legal_reasons => (UNAVAILABLE_FOR_LEGAL_REASONS, "Unavailable For Legal Reasons");
}
