// Conversion of raw handler results into the canonical response

use crate::error::Result;
use crate::logging::trace;
use crate::payload::{JsonOptions, Payload};
use crate::response::Response;
use http::StatusCode;

/// Turns a [`Payload`] into a [`Response`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseNormalizer {
    json: JsonOptions,
}

impl ResponseNormalizer {
    pub fn new(json: JsonOptions) -> Self {
        Self { json }
    }

    pub fn json_options(&self) -> JsonOptions {
        self.json
    }

    pub fn set_json_options(&mut self, json: JsonOptions) {
        self.json = json;
    }

    pub fn normalize(&self, payload: Payload) -> Result<Response> {
        match payload {
            Payload::Response(response) => {
                trace!("Handler returned a response");
                Ok(response)
            }
            Payload::SoftError(error) => {
                trace!(code = %error.code, "Handler returned a soft error");
                Response::from_soft_error(error, StatusCode::INTERNAL_SERVER_ERROR)
            }
            Payload::Foreign(response) => {
                trace!("Adapting protocol-level response");
                Ok(Response::from_http(response))
            }
            Payload::Content(content) => Response::ok()
                .with_json_options(self.json)
                .with_content(content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::payload::{Content, JsonBody, SoftError};
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn test_response_passes_through() {
        let response = Response::text("as is")
            .with_status(StatusCode::ACCEPTED)
            .with_header("x-kept", "1")
            .unwrap();
        let normalized = ResponseNormalizer::default()
            .normalize(response.clone().into())
            .unwrap();

        assert_eq!(normalized.status(), response.status());
        assert_eq!(normalized.headers(), response.headers());
        assert_eq!(normalized.body(), response.body());
    }

    #[test]
    fn test_object_becomes_json() {
        let response = ResponseNormalizer::default()
            .normalize(json!({"id": 1}).into())
            .unwrap();
        assert_eq!(response.header_str("content-type"), Some("application/json"));
        assert_eq!(response.content(), r#"{"id":1}"#);
    }

    #[test]
    fn test_string_has_no_content_type() {
        let response = ResponseNormalizer::default().normalize("plain".into()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("content-type").is_none());
        assert_eq!(response.content(), "plain");
    }

    #[test]
    fn test_soft_error_status() {
        let normalizer = ResponseNormalizer::default();

        let with_status = SoftError::new("gone", "It is gone").with_data(json!({"status": 410}));
        let response = normalizer.normalize(with_status.into()).unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(response.content(), "It is gone");

        let response = normalizer.normalize(SoftError::new("x", "Broken").into()).unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_foreign_response_is_adapted() {
        let foreign = http::Response::builder()
            .status(201)
            .header("x-origin", "foreign")
            .body(Bytes::from_static(b"made"))
            .unwrap();
        let response = ResponseNormalizer::default().normalize(foreign.into()).unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.header_str("x-origin"), Some("foreign"));
        assert_eq!(response.content(), "made");
    }

    #[test]
    fn test_pretty_json() {
        let normalizer = ResponseNormalizer::new(JsonOptions::default().pretty(true));
        let response = normalizer.normalize(json!([1]).into()).unwrap();
        assert_eq!(response.content(), "[\n  1\n]");
    }

    #[test]
    fn test_encoding_failure() {
        struct Opaque;
        impl serde::Serialize for Opaque {
            fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("unsupported"))
            }
        }

        let body = JsonBody::object().field("value", &Opaque);
        let strict = ResponseNormalizer::default().normalize(Content::Json(body.clone()).into());
        assert!(matches!(strict, Err(Error::Serialization(_))));

        let lenient = ResponseNormalizer::new(JsonOptions::default().best_effort(true))
            .normalize(Content::Json(body).into())
            .unwrap();
        assert_eq!(lenient.content(), r#"{"value":null}"#);
    }
}
