//! The request value and its input accessors.

use crate::error::{Error, Result};
use crate::logging::warn;
use crate::routing::CurrentRoute;
use bytes::Bytes;
use http::header::{
    ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderName, HeaderValue,
};
use http::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Lazily yields the route matched for the dispatch this request belongs to.
pub type RouteResolver = Arc<dyn Fn() -> Option<Arc<CurrentRoute>> + Send + Sync>;

const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";
const METHOD_OVERRIDE_FIELD: &str = "_method";

/// An incoming HTTP request.
#[derive(Clone)]
pub struct Request {
    method: String,
    uri: String,
    path: String,
    query_string: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<IpAddr>,
    /// Input set through `merge`/`replace`, layered over the body source.
    overrides: Map<String, Value>,
    replaced: bool,
    route_resolver: Option<RouteResolver>,
}

impl Request {
    /// Create a request for `uri` (path plus optional query string).
    pub fn create(uri: &str, method: &str) -> Self {
        let (path, query_string) = split_uri(uri);
        Self {
            method: method.to_ascii_uppercase(),
            uri: uri.to_string(),
            path,
            query_string,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            overrides: Map::new(),
            replaced: false,
            route_resolver: None,
        }
    }

    pub fn new(method: &str, uri: &str) -> Self {
        Self::create(uri, method)
    }

    /// Build a request from CGI-style variables and a body.
    ///
    /// `HTTP_*` variables become headers. A POST may be re-labelled through
    /// the `X-HTTP-Method-Override` header or a `_method` form field.
    pub fn from_cgi<I, K, V>(vars: I, body: Bytes) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let method = vars
            .get("REQUEST_METHOD")
            .map(String::as_str)
            .unwrap_or("GET");

        let uri = match vars.get("REQUEST_URI") {
            Some(uri) if !uri.is_empty() => uri.clone(),
            _ => {
                let path = vars.get("PATH_INFO").cloned().unwrap_or_else(|| "/".into());
                match vars.get("QUERY_STRING").filter(|q| !q.is_empty()) {
                    Some(query) => format!("{path}?{query}"),
                    None => path,
                }
            }
        };

        let mut request = Self::create(&uri, method).with_body(body);

        for (key, value) in &vars {
            let name = match key.as_str() {
                "CONTENT_TYPE" => Some(CONTENT_TYPE.as_str().to_string()),
                "CONTENT_LENGTH" => Some(CONTENT_LENGTH.as_str().to_string()),
                other => other
                    .strip_prefix("HTTP_")
                    .map(|name| name.replace('_', "-").to_ascii_lowercase()),
            };
            if let Some(name) = name {
                request = request.with_header(&name, value);
            }
        }

        request.remote_addr = vars.get("REMOTE_ADDR").and_then(|addr| addr.parse().ok());
        if vars
            .get("HTTPS")
            .is_some_and(|v| !v.is_empty() && !v.eq_ignore_ascii_case("off"))
            && request.header("x-forwarded-proto").is_none()
        {
            request = request.with_header("x-forwarded-proto", "https");
        }

        request.apply_method_override();
        request
    }

    /// Capture the current request from the CGI environment and stdin.
    pub fn capture() -> Result<Self> {
        let mut body = Vec::new();
        std::io::stdin().read_to_end(&mut body)?;
        Ok(Self::from_cgi(std::env::vars(), Bytes::from(body)))
    }

    /// Build a request from `http` parts. A `SocketAddr` extension is taken
    /// as the peer address.
    pub fn from_http(parts: http::request::Parts, body: Bytes) -> Self {
        let uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let mut request = Self::create(&uri, parts.method.as_str());
        request.remote_addr = parts.extensions.get::<SocketAddr>().map(SocketAddr::ip);
        request.headers = parts.headers;
        if !request.headers.contains_key(HOST) {
            let authority = parts.uri.authority().map(|a| a.as_str());
            if let Some(Ok(host)) = authority.map(HeaderValue::from_str) {
                request.headers.insert(HOST, host);
            }
        }
        request.body = body;
        request
    }

    fn apply_method_override(&mut self) {
        if self.method != "POST" {
            return;
        }
        let method = self
            .header(METHOD_OVERRIDE_HEADER)
            .map(str::to_string)
            .or_else(|| self.form_value(METHOD_OVERRIDE_FIELD));
        if let Some(method) = method.filter(|m| !m.is_empty()) {
            self.method = method.to_ascii_uppercase();
        }
    }

    /// Add a header. Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = name, "Skipping invalid request header"),
        }
        self
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and content type.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn is_method(&self, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// The client address: `REMOTE_ADDR` or the connection's peer.
    pub fn ip(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    /// Whether the request arrived over HTTPS.
    pub fn secure(&self) -> bool {
        self.uri.starts_with("https://")
            || self
                .header("x-forwarded-proto")
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    }

    /// Scheme and host, e.g. `https://example.com`. Empty without a `Host`.
    pub fn root(&self) -> String {
        match self.header(HOST.as_str()) {
            Some(host) => {
                let scheme = if self.secure() { "https" } else { "http" };
                format!("{scheme}://{host}")
            }
            None => String::new(),
        }
    }

    /// The URL without query string or trailing slash.
    pub fn url(&self) -> String {
        format!("{}{}", self.root(), self.path)
            .trim_end_matches('/')
            .to_string()
    }

    /// The URL including the query string.
    pub fn full_url(&self) -> String {
        let url = self.url();
        match self.query_string.as_deref().filter(|q| !q.is_empty()) {
            Some(query) if self.path == "/" => format!("{url}/?{query}"),
            Some(query) => format!("{url}?{query}"),
            None => url,
        }
    }

    /// The token from an `Authorization: Bearer ...` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header(AUTHORIZATION.as_str())?;
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|t| !t.is_empty())
    }

    /// Query string parameters. Repeated keys keep the last value.
    pub fn query(&self) -> Map<String, Value> {
        self.query_string
            .as_deref()
            .map(parse_urlencoded)
            .unwrap_or_default()
    }

    pub fn query_value(&self, key: &str) -> Option<String> {
        self.query()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn form(&self) -> Map<String, Value> {
        if !self.has_content_type("application/x-www-form-urlencoded") {
            return Map::new();
        }
        std::str::from_utf8(&self.body)
            .map(parse_urlencoded)
            .unwrap_or_default()
    }

    fn form_value(&self, key: &str) -> Option<String> {
        self.form().get(key).and_then(Value::as_str).map(str::to_string)
    }

    /// A field of the urlencoded form body.
    pub fn post(&self, key: &str) -> Option<Value> {
        self.form().get(key).cloned()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Deserialization(e.to_string()))
    }

    fn input_source(&self) -> Map<String, Value> {
        let mut source = if self.replaced {
            Map::new()
        } else {
            self.body_source()
        };
        for (key, value) in &self.overrides {
            source.insert(key.clone(), value.clone());
        }
        source
    }

    fn body_source(&self) -> Map<String, Value> {
        if self.is_json() {
            return match self.json::<Value>() {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
        }
        if self.is_method("GET") || self.is_method("HEAD") {
            self.query()
        } else {
            self.form()
        }
    }

    /// All input: the body source (JSON, query or form) plus query values it
    /// does not already contain.
    pub fn all(&self) -> Map<String, Value> {
        let mut input = self.input_source();
        for (key, value) in self.query() {
            input.entry(key).or_insert(value);
        }
        input
    }

    /// Look up an input value. Dots descend into nested JSON.
    pub fn input(&self, key: &str) -> Option<Value> {
        let all = self.all();
        let mut segments = key.split('.');
        let mut current = all.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }

    /// Input value rendered as a string. Objects and arrays yield `None`.
    pub fn input_str(&self, key: &str) -> Option<String> {
        match self.input(key)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// True when every key is present in the input.
    pub fn has(&self, keys: &[&str]) -> bool {
        keys.iter().all(|key| self.input(key).is_some())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.has(&[key])
    }

    /// Top-level input keys.
    pub fn keys(&self) -> Vec<String> {
        self.all().into_iter().map(|(key, _)| key).collect()
    }

    /// Add input on top of the body source. Existing keys are overwritten.
    pub fn merge(&mut self, input: Map<String, Value>) {
        self.overrides.extend(input);
    }

    /// Replace the body-sourced input entirely. Query values still fill in
    /// keys the replacement lacks.
    pub fn replace(&mut self, input: Map<String, Value>) {
        self.overrides = input;
        self.replaced = true;
    }

    /// True when the key is present and not an empty string or null.
    pub fn filled(&self, key: &str) -> bool {
        match self.input(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    pub fn only(&self, keys: &[&str]) -> Map<String, Value> {
        let all = self.all();
        keys.iter()
            .filter_map(|key| all.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect()
    }

    /// Like [`Request::only`], dropping empty values.
    pub fn intersect(&self, keys: &[&str]) -> Map<String, Value> {
        self.only(keys)
            .into_iter()
            .filter(|(_, value)| is_present(value))
            .collect()
    }

    pub fn except(&self, keys: &[&str]) -> Map<String, Value> {
        self.all()
            .into_iter()
            .filter(|(key, _)| !keys.contains(&key.as_str()))
            .collect()
    }

    fn has_content_type(&self, needle: &str) -> bool {
        self.header(CONTENT_TYPE.as_str())
            .map(|ct| ct.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    }

    /// Whether the request body is JSON.
    pub fn is_json(&self) -> bool {
        self.has_content_type("/json") || self.has_content_type("+json")
    }

    /// Whether the most preferred accepted type is JSON.
    pub fn wants_json(&self) -> bool {
        self.header(ACCEPT.as_str())
            .and_then(|accept| accept.split(',').next())
            .map(|first| first.contains("/json") || first.contains("+json"))
            .unwrap_or(false)
    }

    /// Whether a JSON response is appropriate.
    pub fn expects_json(&self) -> bool {
        (self.ajax() && !self.pjax()) || self.wants_json()
    }

    pub fn ajax(&self) -> bool {
        self.header("x-requested-with") == Some("XMLHttpRequest")
    }

    pub fn pjax(&self) -> bool {
        self.header("x-pjax").is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// The route matched for this request, once dispatch has matched one.
    pub fn route(&self) -> Option<Arc<CurrentRoute>> {
        self.route_resolver.as_ref().and_then(|resolve| resolve())
    }

    /// A path parameter of the matched route.
    pub fn route_param(&self, name: &str) -> Option<String> {
        self.route()
            .and_then(|route| route.params.get(name).map(str::to_string))
    }

    pub fn set_route_resolver(&mut self, resolver: RouteResolver) {
        self.route_resolver = Some(resolver);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("remote_addr", &self.remote_addr)
            .field("has_route_resolver", &self.route_resolver.is_some())
            .finish()
    }
}

fn split_uri(uri: &str) -> (String, Option<String>) {
    if let Ok(parsed) = uri.parse::<http::Uri>() {
        let path = match parsed.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };
        return (path, parsed.query().map(str::to_string));
    }

    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (uri, None),
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    (path, query)
}

/// False for null, `false`, zero, `""`, `"0"` and empty containers.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn parse_urlencoded(input: &str) -> Map<String, Value> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(input)
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}
