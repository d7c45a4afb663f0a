//! Property Codec
//!
//! Converts between host values (`Value`) and engine nodes (`Node`) under three
//! decoding policies, and applies the declared-type rules from the property table
//! on both directions.

use crate::errors::{MpvError, MpvResult};
use crate::node::Node;
use crate::properties::{self, PropertyKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::Utf8Error;

// ----------------------------------------------------------------------------
// Host Values
// ----------------------------------------------------------------------------

/// Host-side property value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    None,
    Flag(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Truthiness used by the default wait predicate
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Flag(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floating point
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Flag(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::None)
    }
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// How engine strings are turned into host values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Strings stay as bytes
    Raw,
    /// UTF-8 where valid, bytes for the offending element otherwise
    #[default]
    Lenient,
    /// UTF-8 or failure
    Strict,
}

/// Decode a node, falling back to bytes for invalid UTF-8
pub fn decode_lenient(node: &Node) -> Value {
    match node {
        Node::None => Value::None,
        Node::Flag(b) => Value::Flag(*b),
        Node::Int64(i) => Value::Int(*i),
        Node::Double(d) => Value::Double(*d),
        Node::String(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => Value::Str(s.to_string()),
            Err(_) => Value::Bytes(bytes.clone()),
        },
        Node::ByteArray(bytes) => Value::Bytes(bytes.clone()),
        Node::Array(items) => Value::List(items.iter().map(decode_lenient).collect()),
        Node::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), decode_lenient(v)))
                .collect(),
        ),
    }
}

fn decode_raw(node: &Node) -> Value {
    match node {
        Node::String(bytes) => Value::Bytes(bytes.clone()),
        Node::Array(items) => Value::List(items.iter().map(decode_raw).collect()),
        Node::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), decode_raw(v)))
                .collect(),
        ),
        other => decode_lenient(other),
    }
}

fn decode_strict(node: &Node) -> Result<Value, Utf8Error> {
    Ok(match node {
        Node::String(bytes) => Value::Str(std::str::from_utf8(bytes)?.to_string()),
        Node::Array(items) => Value::List(
            items
                .iter()
                .map(decode_strict)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Node::Map(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                map.insert(k.clone(), decode_strict(v)?);
            }
            Value::Map(map)
        }
        other => decode_lenient(other),
    })
}

/// Decode a node under the given policy. Only `Strict` can fail.
pub fn decode(node: &Node, policy: DecodePolicy) -> Result<Value, Utf8Error> {
    match policy {
        DecodePolicy::Raw => Ok(decode_raw(node)),
        DecodePolicy::Lenient => Ok(decode_lenient(node)),
        DecodePolicy::Strict => decode_strict(node),
    }
}

/// Decode a property value and apply its declared-type rules
pub fn decode_property(name: &str, node: &Node, policy: DecodePolicy) -> MpvResult<Value> {
    let value = decode(node, policy).map_err(|e| MpvError::Decode {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(apply_declared_type(properties::kind_of(name), value))
}

/// Lenient property decoding, which cannot fail. Used for event payloads.
pub fn decode_property_lenient(name: &str, node: &Node) -> Value {
    apply_declared_type(properties::kind_of(name), decode_lenient(node))
}

/// Decode an OSD-string reading. OSD text is always decoded strictly.
pub fn decode_osd(name: &str, node: &Node) -> MpvResult<String> {
    match node {
        Node::String(bytes) => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| MpvError::Decode {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        Node::None => Ok(String::new()),
        other => Err(MpvError::format_error(
            name,
            format!("expected an OSD string, got {:?}", other),
        )),
    }
}

fn apply_declared_type(kind: Option<PropertyKind>, value: Value) -> Value {
    match (kind, value) {
        (Some(PropertyKind::Flag), value) => match value.as_bytes() {
            Some(b"yes") => Value::Flag(true),
            Some(b"no") => Value::Flag(false),
            _ => value,
        },
        (Some(PropertyKind::Integer), value) => match value.as_bytes() {
            Some(b"no") => Value::Flag(false),
            _ => value,
        },
        (Some(PropertyKind::CommaList), Value::Str(s)) => {
            Value::List(split_str(&s).into_iter().map(Value::Str).collect())
        }
        (Some(PropertyKind::CommaList), Value::Bytes(b)) => {
            Value::List(split_bytes(&b).into_iter().map(Value::Bytes).collect())
        }
        (Some(PropertyKind::CommaList), Value::None) => Value::List(Vec::new()),
        (_, value) => value,
    }
}

fn split_str(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',').map(str::to_string).collect()
}

fn split_bytes(b: &[u8]) -> Vec<Vec<u8>> {
    if b.is_empty() {
        return Vec::new();
    }
    b.split(|c| *c == b',').map(<[u8]>::to_vec).collect()
}

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Natural node mapping of a host value. Byte strings become engine strings.
pub fn encode(value: &Value) -> Node {
    match value {
        Value::None => Node::None,
        Value::Flag(b) => Node::Flag(*b),
        Value::Int(i) => Node::Int64(*i),
        Value::Double(d) => Node::Double(*d),
        Value::Str(s) => Node::string(s),
        Value::Bytes(b) => Node::String(b.clone()),
        Value::List(items) => Node::Array(items.iter().map(encode).collect()),
        Value::Map(map) => Node::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect(),
        ),
    }
}

/// Encode a value for writing to `name`, honouring the declared type
pub fn encode_property(name: &str, value: &Value) -> MpvResult<Node> {
    let reject = |what: &str| {
        Err(MpvError::format_error(
            name,
            format!("{} is not accepted by this property", what),
        ))
    };

    match properties::kind_of(name) {
        Some(PropertyKind::Flag) => match value {
            Value::Flag(b) => Ok(Node::Flag(*b)),
            Value::Str(_) | Value::Bytes(_) => match value.as_bytes() {
                Some(b"yes") => Ok(Node::Flag(true)),
                Some(b"no") => Ok(Node::Flag(false)),
                _ => Ok(encode(value)),
            },
            Value::Int(_) | Value::Double(_) => reject("a number"),
            Value::List(_) | Value::Map(_) => reject("a sequence"),
            Value::None => reject("an empty value"),
        },
        Some(PropertyKind::Integer) => match value {
            Value::Int(i) => Ok(Node::Int64(*i)),
            Value::Double(d) => Ok(Node::Double(*d)),
            Value::Flag(b) => Ok(Node::string(if *b { "yes" } else { "no" })),
            Value::Str(_) | Value::Bytes(_) => Ok(encode(value)),
            Value::List(_) | Value::Map(_) => reject("a sequence"),
            Value::None => reject("an empty value"),
        },
        Some(PropertyKind::Float) => match value {
            Value::Int(i) => Ok(Node::Int64(*i)),
            Value::Double(d) => Ok(Node::Double(*d)),
            Value::Str(_) | Value::Bytes(_) => Ok(encode(value)),
            Value::Flag(_) => reject("a flag"),
            Value::List(_) | Value::Map(_) => reject("a sequence"),
            Value::None => reject("an empty value"),
        },
        Some(PropertyKind::CommaList) => match value {
            Value::Str(s) => Ok(Node::Array(split_str(s).into_iter().map(Node::from).collect())),
            Value::Bytes(b) => Ok(Node::Array(
                split_bytes(b).into_iter().map(Node::String).collect(),
            )),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::Str(_) | Value::Bytes(_) => Ok(encode(item)),
                    _ => reject("a non-string list element"),
                })
                .collect::<MpvResult<Vec<_>>>()
                .map(Node::Array),
            _ => reject("a non-string value"),
        },
        Some(PropertyKind::String) | Some(PropertyKind::Bytes) => match value {
            Value::List(_) | Value::Map(_) => reject("a sequence"),
            _ => Ok(encode(value)),
        },
        Some(PropertyKind::Node) | None => Ok(encode(value)),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
