// Writing responses to an output stream

use crate::error::Result;
use crate::response::Response;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, DATE};
use std::io::Write;
use std::time::SystemTime;

/// Status line style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// `Status: 404 Not Found`, for a CGI gateway.
    #[default]
    Cgi,
    /// `HTTP/1.1 404 Not Found`
    Http1,
}

/// Serializes a [`Response`] onto any writer.
#[derive(Debug, Clone)]
pub struct Emitter {
    format: WireFormat,
    charset: String,
}

impl Default for Emitter {
    fn default() -> Self {
        Self {
            format: WireFormat::default(),
            charset: "UTF-8".to_string(),
        }
    }
}

impl Emitter {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Write the status line, headers and body, then flush.
    ///
    /// A body without a content type is sent as `text/html` in the
    /// configured charset. `Date` and `Content-Length` are added when
    /// missing.
    pub fn emit<W: Write>(&self, response: &Response, out: &mut W) -> Result<()> {
        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("");
        match self.format {
            WireFormat::Cgi => write!(out, "Status: {} {}\r\n", status.as_u16(), reason)?,
            WireFormat::Http1 => write!(out, "HTTP/1.1 {} {}\r\n", status.as_u16(), reason)?,
        }

        let headers = response.headers();
        for (name, value) in headers {
            out.write_all(name.as_str().as_bytes())?;
            out.write_all(b": ")?;
            out.write_all(value.as_bytes())?;
            out.write_all(b"\r\n")?;
        }

        let body = response.body();
        if !body.is_empty() && !headers.contains_key(CONTENT_TYPE) {
            write!(out, "content-type: text/html; charset={}\r\n", self.charset)?;
        }
        if !headers.contains_key(DATE) {
            write!(out, "date: {}\r\n", httpdate::fmt_http_date(SystemTime::now()))?;
        }
        if !headers.contains_key(CONTENT_LENGTH) {
            write!(out, "content-length: {}\r\n", body.len())?;
        }

        out.write_all(b"\r\n")?;
        out.write_all(body)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn emit(emitter: &Emitter, response: &Response) -> String {
        let mut out = Vec::new();
        emitter.emit(response, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_cgi_status_line_and_defaults() {
        let response = Response::text("hello").with_status(StatusCode::NOT_FOUND);
        let wire = emit(&Emitter::default(), &response);

        assert!(wire.starts_with("Status: 404 Not Found\r\n"));
        assert!(wire.contains("content-type: text/html; charset=UTF-8\r\n"));
        assert!(wire.contains("content-length: 5\r\n"));
        assert!(wire.contains("date: "));
        assert!(wire.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn test_http1_keeps_existing_content_type() {
        let response = Response::json(&serde_json::json!({"ok": true})).unwrap();
        let wire = emit(&Emitter::new(WireFormat::Http1), &response);

        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-type: application/json\r\n"));
        assert!(!wire.contains("text/html"));
    }

    #[test]
    fn test_empty_body_has_no_default_content_type() {
        let wire = emit(&Emitter::default(), &Response::new(StatusCode::NO_CONTENT));
        assert!(!wire.contains("content-type"));
        assert!(wire.contains("content-length: 0\r\n"));
    }
}
