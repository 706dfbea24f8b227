//! # Dynamic Values
//!
//! [`Value`] is the in-memory form of everything that crosses the wire. The
//! codec never needs a shared schema because every value carries its own
//! shape, and objects and arrays additionally carry type names:
//!
//! - `Object { type_name, .. }` is how requests, envelopes and other tagged
//!   structures identify themselves to the receiver.
//! - `Array { element_type, .. }` is a list whose element type survived the
//!   trip; a plain `List` is the generic ordered container produced when that
//!   knowledge was not carried.
//!
//! Typed Rust values move in and out of this model through serde
//! ([`to_value`], [`from_value`]) and name themselves through [`WireType`].

use crate::error::{ProtocolError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value as Json};
use std::borrow::Cow;
use std::fmt;

/// A self-describing value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Ordered container with no element type attached
    List(Vec<Value>),
    /// Ordered container whose element type is known
    Array {
        element_type: String,
        items: Vec<Value>,
    },
    /// String-keyed entries in insertion order
    Map(Vec<(String, Value)>),
    /// Named fields tagged with the fully-qualified type name
    Object {
        type_name: String,
        fields: Vec<(String, Value)>,
    },
}

impl Value {
    /// Build a tagged object from borrowed field names.
    pub fn object(type_name: impl Into<String>, fields: Vec<(&str, Value)>) -> Value {
        Value::Object {
            type_name: type_name.into(),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type name of a tagged object.
    pub fn object_type(&self) -> Option<&str> {
        match self {
            Value::Object { type_name, .. } => Some(type_name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Array { .. } => "array",
            Value::Map(_) => "map",
            Value::Object { .. } => "object",
        }
    }

    /// Open a tagged object of the expected type for field extraction.
    pub fn into_fields(self, expected: &str) -> Result<Fields> {
        match self {
            Value::Object { type_name, fields } if type_name == expected => {
                Ok(Fields { type_name, fields })
            }
            Value::Object { type_name, .. } => Err(ProtocolError::Serialization(format!(
                "expected {expected}, found {type_name}"
            ))),
            other => Err(ProtocolError::Serialization(format!(
                "expected {expected}, found {}",
                other.kind()
            ))),
        }
    }

    /// One-line description for request logs: type and field names only.
    pub fn summary(&self) -> String {
        match self {
            Value::Object { type_name, fields } => {
                let names: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
                format!("{type_name} {{{}}}", names.join(", "))
            }
            Value::Array {
                element_type,
                items,
            } => format!("{element_type}[{}]", items.len()),
            Value::List(items) => format!("list[{}]", items.len()),
            Value::Map(entries) => format!("map[{}]", entries.len()),
            other => other.kind().to_string(),
        }
    }

    fn from_json(json: Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::I64(i)
                } else if let Some(u) = n.as_u64() {
                    Value::U64(u)
                } else {
                    n.as_f64().map(Value::F64).unwrap_or(Value::Null)
                }
            }
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect()),
            Json::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    fn into_json(self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(b),
            Value::I64(i) => Json::Number(i.into()),
            Value::U64(u) => Json::Number(u.into()),
            // Non-finite floats have no JSON form
            Value::F64(f) => Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null),
            Value::String(s) => Json::String(s),
            Value::Bytes(bytes) => {
                Json::Array(bytes.into_iter().map(|b| Json::Number(b.into())).collect())
            }
            Value::List(items) | Value::Array { items, .. } => {
                Json::Array(items.into_iter().map(Value::into_json).collect())
            }
            Value::Map(entries) | Value::Object { fields: entries, .. } => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key, value.into_json());
                }
                Json::Object(map)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map(Value::String).unwrap_or(Value::Null)
    }
}

/// Fields of a tagged object being taken apart.
#[derive(Debug)]
pub struct Fields {
    type_name: String,
    fields: Vec<(String, Value)>,
}

impl Fields {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Remove a field; absent fields read as `Null`.
    pub fn take(&mut self, name: &str) -> Value {
        match self.fields.iter().position(|(key, _)| key == name) {
            Some(index) => self.fields.swap_remove(index).1,
            None => Value::Null,
        }
    }

    pub fn take_string(&mut self, name: &str) -> Result<String> {
        match self.take(name) {
            Value::String(s) => Ok(s),
            other => Err(self.mismatch(name, "string", &other)),
        }
    }

    pub fn take_opt_string(&mut self, name: &str) -> Result<Option<String>> {
        match self.take(name) {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(self.mismatch(name, "string", &other)),
        }
    }

    pub fn take_u64(&mut self, name: &str) -> Result<u64> {
        match self.take(name) {
            Value::U64(u) => Ok(u),
            Value::I64(i) if i >= 0 => Ok(i as u64),
            other => Err(self.mismatch(name, "unsigned integer", &other)),
        }
    }

    /// Take a field holding a list or typed array.
    pub fn take_items(&mut self, name: &str) -> Result<Vec<Value>> {
        match self.take(name) {
            Value::List(items) | Value::Array { items, .. } => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(self.mismatch(name, "list", &other)),
        }
    }

    fn mismatch(&self, name: &str, expected: &str, found: &Value) -> ProtocolError {
        ProtocolError::Serialization(format!(
            "{}.{name}: expected {expected}, found {}",
            self.type_name,
            found.kind()
        ))
    }
}

/// Names a type on the wire.
///
/// The name is what the receiver dispatches on, so it must be stable and
/// unique across every type a server registers. Use fully-qualified names
/// such as `com.example.query.ListNames`.
pub trait WireType {
    fn wire_name() -> Cow<'static, str>;

    /// Element type name when values of this type are arrays.
    fn element_type() -> Option<Cow<'static, str>> {
        None
    }
}

macro_rules! primitive_wire_types {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl WireType for $ty {
                fn wire_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }
            }
        )*
    };
}

primitive_wire_types! {
    () => "void",
    bool => "bool",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    f32 => "f32",
    f64 => "f64",
    String => "string",
    Value => "value",
}

impl<T: WireType> WireType for Vec<T> {
    fn wire_name() -> Cow<'static, str> {
        Cow::Owned(format!("{}[]", T::wire_name()))
    }

    fn element_type() -> Option<Cow<'static, str>> {
        Some(T::wire_name())
    }
}

impl<T: WireType> WireType for Option<T> {
    fn wire_name() -> Cow<'static, str> {
        T::wire_name()
    }

    fn element_type() -> Option<Cow<'static, str>> {
        T::element_type()
    }
}

/// Implement [`WireType`] for user types.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use wirecall::core::value::WireType;
///
/// #[derive(Serialize, Deserialize)]
/// struct ListNames {}
///
/// wirecall::wire_type!(ListNames => "com.example.ListNames");
/// assert_eq!(ListNames::wire_name(), "com.example.ListNames");
/// ```
#[macro_export]
macro_rules! wire_type {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl $crate::core::value::WireType for $ty {
                fn wire_name() -> ::std::borrow::Cow<'static, str> {
                    ::std::borrow::Cow::Borrowed($name)
                }
            }
        )*
    };
}

/// Convert a typed value into its dynamic form.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map(Value::from_json)
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Convert a dynamic value into a typed one. Type tags are dropped; shapes
/// must line up.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value.into_json())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Convert a typed struct into a tagged object carrying its wire name.
pub fn to_tagged<T: Serialize + WireType>(value: &T) -> Result<Value> {
    tag_value(T::wire_name().into_owned(), to_value(value)?)
}

/// Attach a type name to a value that serialized as named fields.
pub fn tag_value(type_name: String, value: Value) -> Result<Value> {
    match value {
        Value::Map(fields) => Ok(Value::Object { type_name, fields }),
        Value::Object { fields, .. } => Ok(Value::Object { type_name, fields }),
        other => Err(ProtocolError::Serialization(format!(
            "{type_name} must serialize as a struct with named fields, found {}",
            other.kind()
        ))),
    }
}
