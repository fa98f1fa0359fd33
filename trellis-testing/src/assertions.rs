// Test assertions for kernel responses

use crate::TestResponse;

/// Assert that a response has a specific status code
pub fn assert_status(response: &TestResponse, expected: u16) {
    let actual = response.status().unwrap_or(0);
    assert_eq!(actual, expected, "Expected status {expected}, got {actual}");
}

/// Assert that a response body decodes to the expected JSON value
pub fn assert_json<T>(response: &TestResponse, expected: &T)
where
    T: serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let actual: T = response
        .body_json()
        .unwrap_or_else(|e| panic!("Failed to decode response body: {e}"));
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

pub fn assert_header(response: &TestResponse, name: &str, expected: &str) {
    let actual = response.header(name);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{name}' to be '{expected}', got {actual:?}"
    );
}

pub fn assert_no_header(response: &TestResponse, name: &str) {
    let actual = response.header(name);
    assert!(actual.is_none(), "Expected no '{name}' header, got {actual:?}");
}

pub fn assert_body(response: &TestResponse, expected: &str) {
    let body = response.body_string().unwrap_or_default();
    assert_eq!(body, expected, "Unexpected response body");
}

pub fn assert_body_contains(response: &TestResponse, expected: &str) {
    let body = response.body_string().unwrap_or_default();
    assert!(
        body.contains(expected),
        "Expected body to contain '{expected}', but it didn't. Body: {body}"
    );
}

/// Assert that a response is successful (2xx status)
pub fn assert_success(response: &TestResponse) {
    let status = response.status().unwrap_or(0);
    assert!(
        (200..300).contains(&status),
        "Expected successful status (2xx), got {status}"
    );
}

/// Assert that a response is a client error (4xx status)
pub fn assert_client_error(response: &TestResponse) {
    let status = response.status().unwrap_or(0);
    assert!(
        (400..500).contains(&status),
        "Expected client error status (4xx), got {status}"
    );
}

/// Assert that a response is a server error (5xx status)
pub fn assert_server_error(response: &TestResponse) {
    let status = response.status().unwrap_or(0);
    assert!(
        (500..600).contains(&status),
        "Expected server error status (5xx), got {status}"
    );
}

pub fn assert_json_content_type(response: &TestResponse) {
    let content_type = response.header("content-type");
    assert!(
        content_type.is_some_and(|ct| ct.contains("application/json")),
        "Expected JSON content type, got {content_type:?}"
    );
}

pub fn assert_html_content_type(response: &TestResponse) {
    let content_type = response.header("content-type");
    assert!(
        content_type.is_some_and(|ct| ct.contains("text/html")),
        "Expected HTML content type, got {content_type:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Response, StatusCode};

    fn create_test_response(status: u16, body: &str) -> TestResponse {
        let status = StatusCode::from_u16(status).unwrap();
        TestResponse::Success(Response::text(body).with_status(status))
    }

    #[test]
    fn test_assert_status() {
        assert_status(&create_test_response(200, "OK"), 200);
    }

    #[test]
    fn test_assert_body() {
        let response = create_test_response(200, "Hello World");
        assert_body(&response, "Hello World");
        assert_body_contains(&response, "Hello");
    }

    #[test]
    fn test_assert_status_ranges() {
        assert_success(&create_test_response(204, ""));
        assert_client_error(&create_test_response(404, "Not Found"));
        assert_server_error(&create_test_response(500, "Internal Error"));
    }

    #[test]
    fn test_assert_json() {
        let response = TestResponse::Success(Response::json(&serde_json::json!({"a": 1})).unwrap());
        assert_json_content_type(&response);
        assert_json(&response, &serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_assert_header() {
        let response = TestResponse::Success(Response::ok().with_header("x-custom", "value").unwrap());
        assert_header(&response, "x-custom", "value");
        assert_no_header(&response, "allow");
    }

    #[test]
    fn test_assert_html_content_type() {
        let response = TestResponse::Success(Response::ok().with_html("<p>hi</p>"));
        assert_html_content_type(&response);
    }

    #[test]
    #[should_panic(expected = "Expected status 404")]
    fn test_assert_status_failure() {
        assert_status(&create_test_response(200, "OK"), 404);
    }
}
