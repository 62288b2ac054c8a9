//! Conversion of application values into sample documents

use crate::{Document, FtdcError, Result, Value};
use serde::Serialize;

/// Strategy converting a value into a sample document
pub trait Marshaler<T: ?Sized> {
    fn marshal(&self, value: &T) -> Result<Document>;
}

/// Marshals any `Serialize` value whose serialized form is a map
///
/// Integers become `Int64` (unsigned values beyond `i64::MAX` become
/// `Double`), floats become `Double`. Field order follows serialization
/// order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeMarshaler;

impl<T: Serialize + ?Sized> Marshaler<T> for SerdeMarshaler {
    fn marshal(&self, value: &T) -> Result<Document> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(map) => Ok(object_to_document(map)),
            other => Err(FtdcError::Serialization(format!(
                "expected a map, got {}",
                json_kind(&other)
            ))),
        }
    }
}

/// Passes documents through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentMarshaler;

impl Marshaler<Document> for DocumentMarshaler {
    fn marshal(&self, value: &Document) -> Result<Document> {
        Ok(value.clone())
    }
}

/// Convert a parsed JSON object into a document
pub fn json_to_document(value: serde_json::Value) -> Result<Document> {
    SerdeMarshaler.marshal(&value)
}

fn object_to_document(map: serde_json::Map<String, serde_json::Value>) -> Document {
    map.into_iter()
        .map(|(key, value)| crate::Element::new(key, json_to_value(value)))
        .collect()
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(v) => Value::Boolean(v),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(v) => Value::Int64(v),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => Value::Document(object_to_document(map)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
