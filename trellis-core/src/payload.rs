//! Raw handler results.
//!
//! Whatever an action returns is converted into a [`Payload`] before the
//! normalizer sees it. The union is closed so normalization can match it
//! exhaustively.

use crate::error::Result;
use crate::json_capture::JsonNode;
use crate::response::Response;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

/// The raw value produced by a handler.
#[derive(Debug)]
pub enum Payload {
    /// Already canonical; passes through unchanged.
    Response(Response),
    /// A structured application error with an optional status in its data.
    SoftError(SoftError),
    /// A protocol-level response built with the `http` crate.
    Foreign(http::Response<Bytes>),
    /// Anything else: text, bytes or JSON-shaped data.
    Content(Content),
}

/// Response body content before encoding.
#[derive(Debug, Clone, Default)]
pub enum Content {
    #[default]
    Empty,
    Text(String),
    Bytes(Bytes),
    Json(JsonBody),
}

impl Content {
    /// Wrap a serializable value as JSON content.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        Content::Json(JsonBody::new(value))
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Content::Json(_))
    }

    /// Encode the content to body bytes.
    pub fn encode(&self, options: JsonOptions) -> Result<Bytes> {
        match self {
            Content::Empty => Ok(Bytes::new()),
            Content::Text(text) => Ok(Bytes::from(text.clone())),
            Content::Bytes(bytes) => Ok(bytes.clone()),
            Content::Json(json) => json.encode(options),
        }
    }
}

/// JSON encoding options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonOptions {
    pub pretty: bool,
    /// Replace values that cannot be encoded with `null` instead of failing.
    pub best_effort: bool,
}

impl JsonOptions {
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }
}

/// JSON-shaped content that remembers which parts failed to serialize.
///
/// Serialization is attempted eagerly, but a failure is only reported when
/// the body is encoded, so best-effort mode can still emit partial output
/// with `null` in place of the unsupported parts.
#[derive(Debug, Clone)]
pub struct JsonBody {
    root: JsonNode,
}

impl JsonBody {
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Self {
        Self {
            root: JsonNode::capture(value),
        }
    }

    /// Start an object built field by field.
    pub fn object() -> Self {
        Self {
            root: JsonNode::Object(Vec::new()),
        }
    }

    /// Start an array built item by item.
    pub fn array() -> Self {
        Self {
            root: JsonNode::Array(Vec::new()),
        }
    }

    /// Add a field to an object body. Ignored for other shapes.
    pub fn field<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        if let JsonNode::Object(fields) = &mut self.root {
            fields.push((key.into(), JsonNode::capture(value)));
        }
        self
    }

    /// Append an item to an array body. Ignored for other shapes.
    pub fn item<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if let JsonNode::Array(items) = &mut self.root {
            items.push(JsonNode::capture(value));
        }
        self
    }

    pub fn to_value(&self, best_effort: bool) -> Result<Value> {
        self.root.resolve(best_effort)
    }

    pub fn encode(&self, options: JsonOptions) -> Result<Bytes> {
        let value = self.to_value(options.best_effort)?;
        let encoded = if options.pretty {
            serde_json::to_vec_pretty(&value)?
        } else {
            serde_json::to_vec(&value)?
        };
        Ok(Bytes::from(encoded))
    }
}

impl From<Value> for JsonBody {
    fn from(value: Value) -> Self {
        Self {
            root: JsonNode::Value(value),
        }
    }
}

/// A structured application error returned as a value rather than raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoftError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SoftError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The status carried in `data.status`, if present and numeric.
    pub fn status(&self) -> Option<u16> {
        self.data
            .as_ref()
            .and_then(|data| data.get("status"))
            .and_then(|status| match status {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .and_then(|status| u16::try_from(status).ok())
    }
}

impl From<Response> for Payload {
    fn from(response: Response) -> Self {
        Payload::Response(response)
    }
}

impl From<SoftError> for Payload {
    fn from(error: SoftError) -> Self {
        Payload::SoftError(error)
    }
}

impl From<http::Response<Bytes>> for Payload {
    fn from(response: http::Response<Bytes>) -> Self {
        Payload::Foreign(response)
    }
}

impl From<Content> for Payload {
    fn from(content: Content) -> Self {
        Payload::Content(content)
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Content(Content::Empty)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Content(Content::Text(text.to_string()))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Content(Content::Text(text))
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Content(Content::Bytes(bytes))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Content(Content::Bytes(Bytes::from(bytes)))
    }
}

impl From<JsonBody> for Payload {
    fn from(json: JsonBody) -> Self {
        Payload::Content(Content::Json(json))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Content(Content::Empty),
            Value::String(text) => Payload::Content(Content::Text(text)),
            Value::Bool(_) | Value::Number(_) => Payload::Content(Content::Text(value.to_string())),
            Value::Array(_) | Value::Object(_) => Payload::Content(Content::Json(value.into())),
        }
    }
}

macro_rules! scalar_payload {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::Content(Content::Text(value.to_string()))
                }
            }
        )*
    };
}

scalar_payload!(i32, i64, u32, u64, usize, f64);
