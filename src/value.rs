//! Stored values and their conversion into JSON.
//!
//! Values come back from the store as MessagePack, whose maps may be keyed by
//! any scalar. [`RawValue`] models that shape directly; [`canonicalize`] is the
//! only way to turn it into a JSON [`Value`], and it refuses maps whose keys
//! are not strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number};
use thiserror::Error;

pub use serde_json::Value;

/// A value as decoded from the store's wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<RawValue>),
    /// Key/value pairs in wire order. Keys may be of any kind.
    Map(Vec<(RawValue, RawValue)>),
    Ext(i8, Vec<u8>),
}

impl RawValue {
    /// Short name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Nil => "nil",
            RawValue::Bool(_) => "boolean",
            RawValue::Int(_) | RawValue::UInt(_) => "integer",
            RawValue::Float(_) => "float",
            RawValue::String(_) => "string",
            RawValue::Binary(_) => "binary",
            RawValue::Array(_) => "array",
            RawValue::Map(_) => "map",
            RawValue::Ext(..) => "extension",
        }
    }
}

/// A map key in a stored value was not a string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Map key is not a string (found {key_type})")]
pub struct NonStringKey {
    pub key_type: &'static str,
}

/// Convert a decoded store value into a JSON value.
///
/// Arrays keep their order and nulls are preserved. The first map key that is
/// not a string fails the whole conversion; no partial value is returned.
/// Binary and extension payloads become base64 strings.
pub fn canonicalize(raw: RawValue) -> Result<Value, NonStringKey> {
    let value = match raw {
        RawValue::Nil => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(i) => Value::Number(Number::from(i)),
        RawValue::UInt(u) => Value::Number(Number::from(u)),
        RawValue::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        RawValue::String(s) => Value::String(s),
        RawValue::Binary(bytes) | RawValue::Ext(_, bytes) => Value::String(STANDARD.encode(bytes)),
        RawValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(canonicalize)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        RawValue::Map(entries) => {
            let mut map = Map::new();
            for (key, val) in entries {
                let key = match key {
                    RawValue::String(s) => s,
                    other => {
                        return Err(NonStringKey {
                            key_type: other.kind(),
                        });
                    }
                };
                map.insert(key, canonicalize(val)?);
            }
            Value::Object(map)
        }
    };
    Ok(value)
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawValue::Nil,
            Value::Bool(b) => RawValue::Bool(b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    RawValue::UInt(u)
                } else if let Some(i) = n.as_i64() {
                    RawValue::Int(i)
                } else {
                    n.as_f64().map_or(RawValue::Nil, RawValue::Float)
                }
            }
            Value::String(s) => RawValue::String(s),
            Value::Array(items) => RawValue::Array(items.into_iter().map(RawValue::from).collect()),
            Value::Object(map) => RawValue::Map(
                map.into_iter()
                    .map(|(k, v)| (RawValue::String(k), RawValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::String(s.to_string())
    }
}
