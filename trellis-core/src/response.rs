//! The canonical response value.

use crate::error::{Error, Result};
use crate::payload::{Content, JsonOptions, SoftError};
use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, HeaderName, HeaderValue, LOCATION};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;

const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP response produced by dispatch.
///
/// The body is always stored encoded. The content it was built from is kept
/// in [`Response::original`] for introspection and is never re-serialized
/// unless the content is replaced.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    original: Content,
    soft_error: Option<SoftError>,
    exception: Option<Arc<Error>>,
    json_options: JsonOptions,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl Response {
    /// Create an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            original: Content::Empty,
            soft_error: None,
            exception: None,
            json_options: JsonOptions::default(),
        }
    }

    /// Create a 200 OK response.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Create a 200 response with a text body and no content type.
    pub fn text(text: impl Into<String>) -> Self {
        Self::ok().with_text(text)
    }

    /// Create a 200 JSON response.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Self::ok().with_content(Content::json(value))
    }

    /// Build a redirect. Defaults to 302 when `status` is `None`.
    pub fn redirect(url: &str, status: Option<u16>) -> Result<Self> {
        let mut response = Self::new(StatusCode::FOUND);
        if let Some(status) = status {
            response.set_status(status)?;
        }
        response.set_header(LOCATION.as_str(), url, true)?;
        Ok(response)
    }

    /// Build a response from a soft error. The status comes from the error's
    /// `data.status`, falling back to `fallback`.
    pub fn from_soft_error(error: SoftError, fallback: StatusCode) -> Result<Self> {
        let mut response = Self::new(fallback);
        if let Some(status) = error.status() {
            response.set_status(status)?;
        }
        response.set_content(Content::Text(error.message.clone()))?;
        response.soft_error = Some(error);
        Ok(response)
    }

    /// Adapt a protocol-level response field by field.
    pub fn from_http(response: http::Response<Bytes>) -> Self {
        let (parts, body) = response.into_parts();
        let mut adapted = Self::new(parts.status);
        adapted.headers = parts.headers;
        adapted.original = Content::Bytes(body.clone());
        adapted.body = body;
        adapted
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.body = Bytes::from(text.clone());
        self.original = Content::Text(text);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.original = Content::Bytes(body.clone());
        self.body = body;
        self
    }

    /// Set an HTML body and content type.
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=UTF-8"),
        );
        self.with_text(html)
    }

    pub fn with_content(mut self, content: Content) -> Result<Self> {
        self.set_content(content)?;
        Ok(self)
    }

    /// JSON options used when this response (re-)encodes JSON content.
    pub fn with_json_options(mut self, options: JsonOptions) -> Self {
        self.json_options = options;
        self
    }

    /// Replace the content.
    ///
    /// JSON content is encoded with the response's options and sets
    /// `Content-Type: application/json`. Replacing JSON with text keeps the
    /// JSON content type.
    pub fn set_content(&mut self, content: Content) -> Result<&mut Self> {
        self.body = content.encode(self.json_options)?;
        if content.is_json() {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }
        self.original = content;
        Ok(self)
    }

    /// Set the status from a raw code, validating it.
    pub fn set_status(&mut self, status: u16) -> Result<&mut Self> {
        if !(100..=599).contains(&status) {
            return Err(Error::InvalidStatus(status));
        }
        self.status = StatusCode::from_u16(status).map_err(|_| Error::InvalidStatus(status))?;
        Ok(self)
    }

    /// Set a header. With `replace` false the value is appended.
    pub fn set_header(&mut self, name: &str, value: &str, replace: bool) -> Result<&mut Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeader(name.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(name.to_string()))?;
        if replace {
            self.headers.insert(name, value);
        } else {
            self.headers.append(name, value);
        }
        Ok(self)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.set_header(name, value, true)?;
        Ok(self)
    }

    /// Merge headers, replacing existing values of the same name.
    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        self.merge_headers(headers);
        self
    }

    pub(crate) fn merge_headers(&mut self, headers: &HeaderMap) {
        for name in headers.keys() {
            self.headers.remove(name);
            for value in headers.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
    }

    /// Mark the response as uncacheable.
    pub fn no_cache(mut self) -> Self {
        self.headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, must-revalidate, max-age=0"),
        );
        if let Ok(expires) = HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::UNIX_EPOCH))
        {
            self.headers.insert(EXPIRES, expires);
        }
        self
    }

    /// Attach the fault this response was built from.
    pub fn with_exception(mut self, exception: Arc<Error>) -> Self {
        self.exception = Some(exception);
        self
    }

    pub(crate) fn with_soft_error(mut self, error: SoftError) -> Self {
        self.soft_error = Some(error);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text (lossy).
    pub fn content(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// The value the body was built from.
    pub fn original(&self) -> &Content {
        &self.original
    }

    pub fn soft_error(&self) -> Option<&SoftError> {
        self.soft_error.as_ref()
    }

    pub fn exception(&self) -> Option<&Arc<Error>> {
        self.exception.as_ref()
    }

    /// Convert into an `http` response for transport.
    pub fn into_http(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
