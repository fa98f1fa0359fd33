//! Fault classification and error responses.
//!
//! Every fault raised while matching or invoking a route ends up here. The
//! responder picks the status and headers, reports the fault to the logger
//! and builds the response: a canned message in production, a diagnostic
//! page in debug mode.

use crate::error::{Error, Result};
use crate::logging::{FaultRecord, Logger, warn};
use crate::payload::SoftError;
use crate::response::Response;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::json;
use std::fmt::{self, Write as _};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Production body for 404 responses.
pub const NOT_FOUND_MESSAGE: &str = "Sorry, the page you are looking for could not be found.";

/// Production body for every other error status.
pub const GENERIC_MESSAGE: &str = "Whoops, looks like something went wrong.";

/// Error code carried by the soft error attached to production responses.
pub const HTTP_ERROR_CODE: &str = "http_error";

/// Renders the debug-mode page for a fault.
pub trait DiagnosticRenderer: Send + Sync {
    fn render(&self, fault: &Error, status: StatusCode) -> String;

    fn content_type(&self) -> &'static str {
        "text/html; charset=UTF-8"
    }
}

/// Self-contained HTML page with the status, fault kind, message and
/// source chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlDiagnosticRenderer;

impl DiagnosticRenderer for HtmlDiagnosticRenderer {
    fn render(&self, fault: &Error, status: StatusCode) -> String {
        let title = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error")
        );
        let chain = FaultRecord::new(fault, status).chain();

        let mut page = String::with_capacity(1024);
        page.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n");
        let _ = writeln!(page, "<title>{}</title>", escape_html(&title));
        page.push_str(
            "<style>body{font-family:sans-serif;margin:2em;color:#222}\
             .kind{color:#888;text-transform:uppercase;font-size:.8em}\
             .message{font-size:1.3em}li{font-family:monospace}</style>\n",
        );
        page.push_str("</head>\n<body>\n");
        let _ = writeln!(page, "<h1>{}</h1>", escape_html(&title));
        let _ = writeln!(page, "<p class=\"kind\">{}</p>", escape_html(fault.kind()));
        let _ = writeln!(
            page,
            "<p class=\"message\">{}</p>",
            escape_html(&fault.to_string())
        );
        if !chain.is_empty() {
            page.push_str("<h2>Caused by</h2>\n<ol>\n");
            for cause in &chain {
                let _ = writeln!(page, "<li>{}</li>", escape_html(cause));
            }
            page.push_str("</ol>\n");
        }
        page.push_str("</body>\n</html>\n");
        page
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Classifies faults and builds their responses.
#[derive(Clone)]
pub struct ErrorResponder {
    debug: bool,
    renderer: Option<Arc<dyn DiagnosticRenderer>>,
    logger: Option<Arc<dyn Logger>>,
}

impl Default for ErrorResponder {
    fn default() -> Self {
        Self {
            debug: false,
            renderer: Some(Arc::new(HtmlDiagnosticRenderer)),
            logger: None,
        }
    }
}

impl ErrorResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Replace the debug renderer. `None` makes debug mode re-raise faults.
    pub fn set_renderer(&mut self, renderer: Option<Arc<dyn DiagnosticRenderer>>) {
        self.renderer = renderer;
    }

    pub fn set_logger(&mut self, logger: Option<Arc<dyn Logger>>) {
        self.logger = logger;
    }

    /// Status and extra headers for a fault.
    ///
    /// Faults with the HTTP-error capability supply both; anything else is
    /// a 500 without headers.
    pub fn classify(&self, fault: &Error) -> (StatusCode, HeaderMap) {
        match fault.as_http_fault() {
            Some(http) => (http.status_code(), http.headers().clone()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new()),
        }
    }

    /// Build the response for a fault without reporting it.
    ///
    /// Returns `None` in debug mode when there is no renderer.
    pub fn render(&self, fault: &Error) -> Option<Response> {
        let (status, headers) = self.classify(fault);

        if !self.debug {
            return Some(canned(status, &headers));
        }

        let renderer = self.renderer.as_ref()?;
        let page = match catch_unwind(AssertUnwindSafe(|| renderer.render(fault, status))) {
            Ok(page) => page,
            Err(_) => {
                warn!(status = status.as_u16(), "Diagnostic renderer panicked");
                return Some(canned(status, &headers));
            }
        };
        let mut response = Response::new(status)
            .with_text(page)
            .with_headers(&headers);
        if let Ok(content_type) = HeaderValue::from_str(renderer.content_type()) {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        Some(response)
    }

    /// Report the fault and convert it into a response.
    ///
    /// In debug mode without a renderer the fault is handed back as `Err`.
    pub fn respond(&self, fault: Error) -> Result<Response> {
        let (status, _) = self.classify(&fault);
        self.report(&fault, status);

        match self.render(&fault) {
            Some(response) if self.debug => Ok(response.with_exception(Arc::new(fault))),
            Some(response) => Ok(response),
            None => Err(fault),
        }
    }

    fn report(&self, fault: &Error, status: StatusCode) {
        let Some(logger) = &self.logger else {
            return;
        };
        let record = FaultRecord::new(fault, status);
        let message = fault.to_string();

        match catch_unwind(AssertUnwindSafe(|| logger.error(&message, &record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Fault logger failed"),
            Err(_) => warn!("Fault logger panicked"),
        }
    }
}

impl fmt::Debug for ErrorResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorResponder")
            .field("debug", &self.debug)
            .field("has_renderer", &self.renderer.is_some())
            .field("has_logger", &self.logger.is_some())
            .finish()
    }
}

/// The production response for a status: a canned message, the fault's
/// headers and a soft error describing the status.
fn canned(status: StatusCode, headers: &HeaderMap) -> Response {
    let message = if status == StatusCode::NOT_FOUND {
        NOT_FOUND_MESSAGE
    } else {
        GENERIC_MESSAGE
    };
    let soft_error =
        SoftError::new(HTTP_ERROR_CODE, message).with_data(json!({ "status": status.as_u16() }));
    Response::new(status)
        .with_text(message)
        .with_headers(headers)
        .with_soft_error(soft_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_error::HttpError;
    use crate::logging::LogError;
    use http::header::ALLOW;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<(String, u16)>>);

    impl Logger for Recording {
        fn error(&self, message: &str, record: &FaultRecord<'_>) -> std::result::Result<(), LogError> {
            self.0.lock().push((message.to_string(), record.status.as_u16()));
            Ok(())
        }
    }

    struct Broken;

    impl Logger for Broken {
        fn error(&self, _: &str, _: &FaultRecord<'_>) -> std::result::Result<(), LogError> {
            Err(LogError::Unavailable("sink closed".into()))
        }
    }

    struct Panicking;

    impl Logger for Panicking {
        fn error(&self, _: &str, _: &FaultRecord<'_>) -> std::result::Result<(), LogError> {
            panic!("logger exploded")
        }
    }

    #[test]
    fn test_production_not_found() {
        let response = ErrorResponder::new()
            .respond(HttpError::not_found().into())
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.content(), NOT_FOUND_MESSAGE);
        assert!(response.exception().is_none());
        assert_eq!(response.soft_error().unwrap().status(), Some(404));
    }

    #[test]
    fn test_production_hides_internal_message() {
        let response = ErrorResponder::new()
            .respond(Error::Resolution("App\\Secret\\Thing".into()))
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.content(), GENERIC_MESSAGE);
        assert!(!response.content().contains("Secret"));
    }

    #[test]
    fn test_method_not_allowed_keeps_allow_header() {
        let response = ErrorResponder::new()
            .respond(HttpError::method_not_allowed(["GET", "POST"]).into())
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "GET, POST");
    }

    #[test]
    fn test_declared_error_without_headers() {
        let response = ErrorResponder::new()
            .respond(HttpError::too_many_requests().into())
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().is_empty());
    }

    #[test]
    fn test_debug_renders_diagnostic_page() {
        let mut responder = ErrorResponder::new();
        responder.set_debug(true);
        let response = responder
            .respond(Error::Invocation("<boom>".into()))
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.content().contains("&lt;boom&gt;"));
        assert!(!response.content().contains(GENERIC_MESSAGE));
        assert_eq!(response.header_str("content-type"), Some("text/html; charset=UTF-8"));
        assert!(response.exception().is_some());
    }

    struct ExplodingRenderer;

    impl DiagnosticRenderer for ExplodingRenderer {
        fn render(&self, _: &Error, _: StatusCode) -> String {
            panic!("renderer exploded")
        }
    }

    #[test]
    fn test_panicking_renderer_falls_back_to_canned_body() {
        let mut responder = ErrorResponder::new();
        responder.set_debug(true);
        responder.set_renderer(Some(Arc::new(ExplodingRenderer)));
        let response = responder.respond(HttpError::gone().into()).unwrap();

        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(response.content(), GENERIC_MESSAGE);
        assert!(response.exception().is_some());
    }

    #[test]
    fn test_debug_without_renderer_reraises() {
        let mut responder = ErrorResponder::new();
        responder.set_debug(true);
        responder.set_renderer(None);
        let result = responder.respond(Error::Panic("kaboom".into()));
        assert!(matches!(result, Err(Error::Panic(_))));
    }

    #[test]
    fn test_render_is_idempotent() {
        let responder = ErrorResponder::new();
        let fault: Error = HttpError::method_not_allowed(["GET"]).into();
        let first = responder.render(&fault).unwrap();
        let second = responder.render(&fault).unwrap();
        assert_eq!(first.status(), second.status());
        assert_eq!(first.headers(), second.headers());
        assert_eq!(first.body(), second.body());
    }

    #[test]
    fn test_logger_receives_fault() {
        let logger = Arc::new(Recording::default());
        let mut responder = ErrorResponder::new();
        responder.set_logger(Some(logger.clone()));
        responder.respond(HttpError::gone().into()).unwrap();
        assert_eq!(*logger.0.lock(), vec![("Gone".to_string(), 410)]);
    }

    #[test]
    fn test_logger_failure_does_not_abort() {
        for logger in [Arc::new(Broken) as Arc<dyn Logger>, Arc::new(Panicking)] {
            let mut responder = ErrorResponder::new();
            responder.set_logger(Some(logger));
            let response = responder.respond(HttpError::conflict().into()).unwrap();
            assert_eq!(response.status(), StatusCode::CONFLICT);
        }
    }
}
