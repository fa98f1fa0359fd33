// Test client dispatching straight into a kernel

use bytes::Bytes;
use std::sync::Arc;
use trellis_core::{Error, Kernel, Request, Response};

/// Makes requests against a kernel without a socket.
#[derive(Debug, Clone)]
pub struct TestClient {
    kernel: Arc<Kernel>,
}

impl TestClient {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn get(&self, uri: &str) -> TestResponse {
        self.send(TestRequestBuilder::new("GET", uri))
    }

    pub fn post(&self, uri: &str, body: impl Into<Bytes>) -> TestResponse {
        self.send(TestRequestBuilder::new("POST", uri).body(body))
    }

    pub fn put(&self, uri: &str, body: impl Into<Bytes>) -> TestResponse {
        self.send(TestRequestBuilder::new("PUT", uri).body(body))
    }

    pub fn patch(&self, uri: &str, body: impl Into<Bytes>) -> TestResponse {
        self.send(TestRequestBuilder::new("PATCH", uri).body(body))
    }

    pub fn delete(&self, uri: &str) -> TestResponse {
        self.send(TestRequestBuilder::new("DELETE", uri))
    }

    /// Dispatch a built request.
    pub fn send(&self, builder: TestRequestBuilder) -> TestResponse {
        self.request(builder.build())
    }

    pub fn request(&self, request: Request) -> TestResponse {
        match self.kernel.dispatch(request) {
            Ok(response) => TestResponse::Success(response),
            Err(error) => TestResponse::Escalated(error),
        }
    }
}

/// Builder for test requests
#[derive(Debug, Clone)]
pub struct TestRequestBuilder {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Bytes,
}

impl TestRequestBuilder {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and content type.
    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = Bytes::from(serde_json::to_vec(data)?);
        Ok(self.header("content-type", "application/json"))
    }

    /// Set a urlencoded form body and content type.
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.header("content-type", "application/x-www-form-urlencoded")
            .body(body)
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> Request {
        let uri = if self.query.is_empty() {
            self.path
        } else {
            let query = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            let separator = if self.path.contains('?') { '&' } else { '?' };
            format!("{}{}{}", self.path, separator, query)
        };

        self.headers
            .iter()
            .fold(Request::create(&uri, &self.method), |request, (k, v)| {
                request.with_header(k, v)
            })
            .with_body(self.body)
    }
}

fn encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b' ' => encoded.push('+'),
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

/// Response from a test request
#[derive(Debug)]
pub enum TestResponse {
    Success(Response),
    /// The kernel handed the fault back instead of responding.
    Escalated(Error),
}

impl TestResponse {
    pub fn assert_success(&self) -> &Response {
        match self {
            TestResponse::Success(response) => response,
            TestResponse::Escalated(error) => {
                panic!("Expected a response, got escalated fault: {error:?}")
            }
        }
    }

    pub fn assert_escalated(&self) -> &Error {
        match self {
            TestResponse::Escalated(error) => error,
            TestResponse::Success(response) => {
                panic!("Expected an escalated fault, got status {}", response.status())
            }
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            TestResponse::Success(response) => Some(response),
            TestResponse::Escalated(_) => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.response().map(Response::status_code)
    }

    pub fn body_string(&self) -> Option<String> {
        self.response()
            .and_then(|response| String::from_utf8(response.body().to_vec()).ok())
    }

    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        match self {
            TestResponse::Success(response) => serde_json::from_slice(response.body())
                .map_err(|e| format!("Deserialization error: {e}")),
            TestResponse::Escalated(error) => Err(format!("{error:?}")),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.response().and_then(|response| response.header_str(name))
    }
}
