//! Ordered, self-describing sample documents
//!
//! A [`Document`] is an ordered list of named [`Value`]s, possibly nested.
//! Field order is significant: metric extraction and reconstruction both
//! walk a document depth-first in insertion order, expanding arrays by
//! index.

use crate::{FtdcError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the length prefix in front of every serialized document
pub const DOCUMENT_HEADER_SIZE: usize = 4;

/// A typed value stored in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean
    Boolean(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit float
    Double(f64),
    /// Milliseconds since the Unix epoch
    DateTime(i64),
    /// Two-part timestamp: seconds and an ordinal increment
    Timestamp { t: u32, i: u32 },
    /// UTF-8 string
    String(String),
    /// 12-byte object identifier
    ObjectId([u8; 12]),
    /// Opaque bytes
    Binary(Vec<u8>),
    /// Null
    Null,
    /// Embedded document
    Document(Document),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Get as i64, widening 32-bit integers
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Int32(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Render as JSON for display
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Boolean(v) => Json::Bool(*v),
            Value::Int32(v) => Json::from(*v),
            Value::Int64(v) => Json::from(*v),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::DateTime(ms) => match Utc.timestamp_millis_opt(*ms).single() {
                Some(dt) => Json::String(dt.to_rfc3339()),
                None => Json::from(*ms),
            },
            Value::Timestamp { t, i } => serde_json::json!({ "t": t, "i": i }),
            Value::String(v) => Json::String(v.clone()),
            Value::ObjectId(bytes) => Json::String(hex(bytes)),
            Value::Binary(bytes) => Json::String(hex(bytes)),
            Value::Null => Json::Null,
            Value::Document(doc) => doc.to_json(),
            Value::Array(values) => Json::Array(values.iter().map(Value::to_json).collect()),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

/// A named value inside a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub key: String,
    pub value: Value,
}

impl Element {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered mapping of keys to typed values
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    elements: Vec<Element>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    /// Append a field; duplicate keys are kept in order
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.elements.push(Element::new(key, value));
    }

    /// Get the first field with the given key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.elements
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.value)
    }

    /// Resolve a dotted path such as `a.b.0.c`
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.get(segment)?,
                Value::Array(values) => values.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterate over fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|e| e.key.as_str())
    }

    /// Serialize with a self-describing length prefix
    ///
    /// Format:
    /// - 4 bytes: total length including this prefix
    /// - N bytes: bincode body
    pub fn to_bytes(&self) -> Result<Bytes> {
        let body = bincode::serialize(self)?;
        let total = DOCUMENT_HEADER_SIZE + body.len();
        if total > u32::MAX as usize {
            return Err(FtdcError::Serialization(format!(
                "document too large: {} bytes",
                total
            )));
        }

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32_le(total as u32);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Deserialize one document from the front of `data`, returning it and
    /// the number of bytes consumed
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < DOCUMENT_HEADER_SIZE {
            return Err(FtdcError::InvalidFormat("Document too short".into()));
        }

        let mut len_bytes = [0u8; DOCUMENT_HEADER_SIZE];
        len_bytes.copy_from_slice(&data[..DOCUMENT_HEADER_SIZE]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len < DOCUMENT_HEADER_SIZE {
            return Err(FtdcError::InvalidFormat(format!(
                "Invalid document length: {}",
                len
            )));
        }
        if data.len() < len {
            return Err(FtdcError::InvalidFormat(format!(
                "Document truncated: declared {} bytes, {} available",
                len,
                data.len()
            )));
        }

        let doc = bincode::deserialize(&data[DOCUMENT_HEADER_SIZE..len])?;
        Ok((doc, len))
    }

    /// Render as a JSON object for display
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.elements.len());
        for element in &self.elements {
            map.insert(element.key.clone(), element.value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl FromIterator<Element> for Document {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
