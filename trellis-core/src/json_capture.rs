// Partial JSON capture.
//
// Serializes a value into a tree that keeps the parts that encoded and marks
// the leaves that did not, so best-effort encoding can emit everything else.

use crate::error::{Error, Result};
use serde::Serialize;
use serde::ser::{self, Impossible};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone)]
pub(crate) enum JsonNode {
    Value(Value),
    Unsupported(String),
    Object(Vec<(String, JsonNode)>),
    Array(Vec<JsonNode>),
}

impl JsonNode {
    /// Serialize `value`. A failing leaf becomes `Unsupported` in place; the
    /// rest of the tree is kept.
    pub(crate) fn capture<T: Serialize + ?Sized>(value: &T) -> Self {
        value
            .serialize(NodeSerializer)
            .unwrap_or_else(|e| JsonNode::Unsupported(e.0))
    }

    pub(crate) fn resolve(&self, best_effort: bool) -> Result<Value> {
        match self {
            JsonNode::Value(value) => Ok(value.clone()),
            JsonNode::Unsupported(_) if best_effort => Ok(Value::Null),
            JsonNode::Unsupported(reason) => Err(Error::Serialization(reason.clone())),
            JsonNode::Object(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (key, node) in fields {
                    map.insert(key.clone(), node.resolve(best_effort)?);
                }
                Ok(Value::Object(map))
            }
            JsonNode::Array(items) => items
                .iter()
                .map(|node| node.resolve(best_effort))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

#[derive(Debug)]
pub(crate) struct CaptureError(String);

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CaptureError {}

impl ser::Error for CaptureError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CaptureError(msg.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(e: serde_json::Error) -> Self {
        CaptureError(e.to_string())
    }
}

fn leaf(value: std::result::Result<Value, serde_json::Error>) -> std::result::Result<JsonNode, CaptureError> {
    Ok(JsonNode::Value(value?))
}

/// Builds a [`JsonNode`] tree. Scalars go through serde_json's value
/// serializer; compound values capture each element on its own.
struct NodeSerializer;

type Captured = std::result::Result<JsonNode, CaptureError>;

impl ser::Serializer for NodeSerializer {
    type Ok = JsonNode;
    type Error = CaptureError;

    type SerializeSeq = SeqCapture;
    type SerializeTuple = SeqCapture;
    type SerializeTupleStruct = SeqCapture;
    type SerializeTupleVariant = VariantSeqCapture;
    type SerializeMap = MapCapture;
    type SerializeStruct = MapCapture;
    type SerializeStructVariant = VariantMapCapture;

    fn serialize_bool(self, v: bool) -> Captured {
        Ok(JsonNode::Value(Value::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Captured {
        Ok(JsonNode::Value(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Captured {
        Ok(JsonNode::Value(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Captured {
        Ok(JsonNode::Value(v.into()))
    }

    fn serialize_i64(self, v: i64) -> Captured {
        Ok(JsonNode::Value(v.into()))
    }

    fn serialize_i128(self, v: i128) -> Captured {
        leaf(ser::Serializer::serialize_i128(serde_json::value::Serializer, v))
    }

    fn serialize_u8(self, v: u8) -> Captured {
        Ok(JsonNode::Value(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Captured {
        Ok(JsonNode::Value(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Captured {
        Ok(JsonNode::Value(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Captured {
        Ok(JsonNode::Value(v.into()))
    }

    fn serialize_u128(self, v: u128) -> Captured {
        leaf(ser::Serializer::serialize_u128(serde_json::value::Serializer, v))
    }

    fn serialize_f32(self, v: f32) -> Captured {
        leaf(ser::Serializer::serialize_f32(serde_json::value::Serializer, v))
    }

    fn serialize_f64(self, v: f64) -> Captured {
        leaf(ser::Serializer::serialize_f64(serde_json::value::Serializer, v))
    }

    fn serialize_char(self, v: char) -> Captured {
        Ok(JsonNode::Value(Value::String(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Captured {
        Ok(JsonNode::Value(Value::String(v.to_string())))
    }

    fn serialize_bytes(self, v: &[u8]) -> Captured {
        leaf(ser::Serializer::serialize_bytes(serde_json::value::Serializer, v))
    }

    fn serialize_none(self) -> Captured {
        Ok(JsonNode::Value(Value::Null))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Captured {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Captured {
        Ok(JsonNode::Value(Value::Null))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Captured {
        Ok(JsonNode::Value(Value::Null))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Captured {
        Ok(JsonNode::Value(Value::String(variant.to_string())))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Captured {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Captured {
        Ok(JsonNode::Object(vec![(
            variant.to_string(),
            JsonNode::capture(value),
        )]))
    }

    fn serialize_seq(self, len: Option<usize>) -> std::result::Result<SeqCapture, CaptureError> {
        Ok(SeqCapture {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> std::result::Result<SeqCapture, CaptureError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> std::result::Result<SeqCapture, CaptureError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> std::result::Result<VariantSeqCapture, CaptureError> {
        Ok(VariantSeqCapture {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> std::result::Result<MapCapture, CaptureError> {
        Ok(MapCapture {
            fields: Vec::with_capacity(len.unwrap_or(0)),
            next_key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> std::result::Result<MapCapture, CaptureError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> std::result::Result<VariantMapCapture, CaptureError> {
        Ok(VariantMapCapture {
            variant,
            fields: Vec::with_capacity(len),
        })
    }
}

struct SeqCapture {
    items: Vec<JsonNode>,
}

impl ser::SerializeSeq for SeqCapture {
    type Ok = JsonNode;
    type Error = CaptureError;

    fn serialize_element<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), CaptureError> {
        self.items.push(JsonNode::capture(value));
        Ok(())
    }

    fn end(self) -> Captured {
        Ok(JsonNode::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqCapture {
    type Ok = JsonNode;
    type Error = CaptureError;

    fn serialize_element<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), CaptureError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Captured {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqCapture {
    type Ok = JsonNode;
    type Error = CaptureError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), CaptureError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Captured {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqCapture {
    variant: &'static str,
    items: Vec<JsonNode>,
}

impl ser::SerializeTupleVariant for VariantSeqCapture {
    type Ok = JsonNode;
    type Error = CaptureError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), CaptureError> {
        self.items.push(JsonNode::capture(value));
        Ok(())
    }

    fn end(self) -> Captured {
        Ok(JsonNode::Object(vec![(
            self.variant.to_string(),
            JsonNode::Array(self.items),
        )]))
    }
}

struct MapCapture {
    fields: Vec<(String, JsonNode)>,
    next_key: Option<String>,
}

impl ser::SerializeMap for MapCapture {
    type Ok = JsonNode;
    type Error = CaptureError;

    fn serialize_key<T: Serialize + ?Sized>(
        &mut self,
        key: &T,
    ) -> std::result::Result<(), CaptureError> {
        self.next_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), CaptureError> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| <CaptureError as ser::Error>::custom("map value without a key"))?;
        self.fields.push((key, JsonNode::capture(value)));
        Ok(())
    }

    fn end(self) -> Captured {
        Ok(JsonNode::Object(self.fields))
    }
}

impl ser::SerializeStruct for MapCapture {
    type Ok = JsonNode;
    type Error = CaptureError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> std::result::Result<(), CaptureError> {
        self.fields.push((key.to_string(), JsonNode::capture(value)));
        Ok(())
    }

    fn end(self) -> Captured {
        Ok(JsonNode::Object(self.fields))
    }
}

struct VariantMapCapture {
    variant: &'static str,
    fields: Vec<(String, JsonNode)>,
}

impl ser::SerializeStructVariant for VariantMapCapture {
    type Ok = JsonNode;
    type Error = CaptureError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> std::result::Result<(), CaptureError> {
        self.fields.push((key.to_string(), JsonNode::capture(value)));
        Ok(())
    }

    fn end(self) -> Captured {
        Ok(JsonNode::Object(vec![(
            self.variant.to_string(),
            JsonNode::Object(self.fields),
        )]))
    }
}

/// Map keys must come out as strings, the way JSON objects need them.
struct KeySerializer;

type Key = std::result::Result<String, CaptureError>;

fn key_error() -> CaptureError {
    <CaptureError as ser::Error>::custom("object key must be a string")
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = CaptureError;

    type SerializeSeq = Impossible<String, CaptureError>;
    type SerializeTuple = Impossible<String, CaptureError>;
    type SerializeTupleStruct = Impossible<String, CaptureError>;
    type SerializeTupleVariant = Impossible<String, CaptureError>;
    type SerializeMap = Impossible<String, CaptureError>;
    type SerializeStruct = Impossible<String, CaptureError>;
    type SerializeStructVariant = Impossible<String, CaptureError>;

    fn serialize_bool(self, v: bool) -> Key {
        Ok(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> Key {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Key {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Key {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Key {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Key {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Key {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Key {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Key {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> Key {
        Err(key_error())
    }

    fn serialize_f64(self, _v: f64) -> Key {
        Err(key_error())
    }

    fn serialize_char(self, v: char) -> Key {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Key {
        Ok(v.to_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Key {
        Err(key_error())
    }

    fn serialize_none(self) -> Key {
        Err(key_error())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Key {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Key {
        Err(key_error())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Key {
        Err(key_error())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Key {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Key {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Key {
        Err(key_error())
    }

    fn serialize_seq(
        self,
        _len: Option<usize>,
    ) -> std::result::Result<Self::SerializeSeq, CaptureError> {
        Err(key_error())
    }

    fn serialize_tuple(self, _len: usize) -> std::result::Result<Self::SerializeTuple, CaptureError> {
        Err(key_error())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeTupleStruct, CaptureError> {
        Err(key_error())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeTupleVariant, CaptureError> {
        Err(key_error())
    }

    fn serialize_map(
        self,
        _len: Option<usize>,
    ) -> std::result::Result<Self::SerializeMap, CaptureError> {
        Err(key_error())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeStruct, CaptureError> {
        Err(key_error())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeStructVariant, CaptureError> {
        Err(key_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serializer;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct Opaque;

    impl Serialize for Opaque {
        fn serialize<S: Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(ser::Error::custom("Type is not supported"))
        }
    }

    #[derive(Serialize)]
    struct Item {
        ok: u32,
        bad: Opaque,
        tags: Vec<&'static str>,
    }

    #[derive(Serialize)]
    enum Shape {
        Circle { radius: f64, fill: Opaque },
    }

    #[test]
    fn test_derived_struct_keeps_good_fields() {
        let node = JsonNode::capture(&Item {
            ok: 1,
            bad: Opaque,
            tags: vec!["a", "b"],
        });
        assert_eq!(
            node.resolve(true).unwrap(),
            json!({"ok": 1, "bad": null, "tags": ["a", "b"]})
        );
        assert!(matches!(node.resolve(false), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_nested_sequences_and_maps() {
        let mut map = BTreeMap::new();
        map.insert(7, vec![Some(Opaque), None]);
        let node = JsonNode::capture(&map);
        assert_eq!(node.resolve(true).unwrap(), json!({"7": [null, null]}));
    }

    #[test]
    fn test_struct_variant() {
        let node = JsonNode::capture(&Shape::Circle {
            radius: 2.5,
            fill: Opaque,
        });
        assert_eq!(
            node.resolve(true).unwrap(),
            json!({"Circle": {"radius": 2.5, "fill": null}})
        );
    }

    #[test]
    fn test_unsupported_root() {
        let node = JsonNode::capture(&Opaque);
        assert_eq!(node.resolve(true).unwrap(), Value::Null);
    }

    #[test]
    fn test_plain_values_match_serde_json() {
        let value = json!({"a": [1, 2.5, "x", true, null]});
        assert_eq!(JsonNode::capture(&value).resolve(false).unwrap(), value);
    }
}
