//! # Value Type Definitions
//!
//! Dynamically typed values exchanged with the server, plus the two shapes
//! built from them that the rest of the workspace passes around: remote
//! records and domain filters.
//!
//! ## Design Principles
//!
//! 1. **Closed Value Model**: `Value` mirrors the XML-RPC type set exactly so
//!    encoding and decoding are total functions over it.
//! 2. **Ordered Structs**: `BTreeMap` keeps struct members in a stable order,
//!    which makes encoded payloads deterministic and easy to assert on.
//! 3. **Opaque Domains**: `Domain` wraps a value without interpreting it; the
//!    server owns the filter grammar.
//! 4. **JSON Bridge**: conversions from `serde_json::Value` let callers write
//!    filters and record payloads with `json!`.
//!
//! ## Shapes on the Wire
//!
//! ```text
//! Remote record (search_read row):
//! { "id": 42, "name": "Acme", "is_company": true, "parent_id": [7, "Holding"] }
//!
//! Domain (conjunction of field/operator/value triples):
//! [ ["is_company", "=", true], ["id", "in", [1, 2, 3]] ]
//! ```

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

/// Untyped record as returned by `search_read`: field name to value.
pub type RemoteRecord = BTreeMap<String, Value>;

/// Dynamically typed XML-RPC value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// `<nil/>`, also used for JSON null.
    #[default]
    Nil,
    /// `<boolean>`.
    Bool(bool),
    /// `<int>`, `<i4>` or `<i8>`.
    Int(i64),
    /// `<double>`.
    Double(f64),
    /// `<string>` or untyped text.
    String(String),
    /// `<dateTime.iso8601>`, kept verbatim.
    DateTime(String),
    /// `<base64>`, decoded bytes.
    Base64(Bytes),
    /// `<array>`.
    Array(Vec<Value>),
    /// `<struct>`.
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Base64(_) => "base64",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) | Value::DateTime(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Consumes the value, returning struct members when it is a struct.
    pub fn into_struct(self) -> Option<BTreeMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Consumes the value, returning the items when it is an array.
    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Builds an array of integers, the shape used for id lists.
    pub fn id_list(ids: &[i64]) -> Value {
        Value::Array(ids.iter().copied().map(Value::Int).collect())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Base64(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(members: BTreeMap<String, Value>) -> Self {
        Value::Struct(members)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(flag) => Value::Bool(flag),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(int) => Value::Int(int),
                None => Value::Double(number.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(text) => Value::String(text),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(members) => Value::Struct(
                members
                    .into_iter()
                    .map(|(name, member)| (name, Value::from(member)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(flag) => write!(f, "{}", flag),
            Value::Int(int) => write!(f, "{}", int),
            Value::Double(double) => write!(f, "{}", double),
            Value::String(text) | Value::DateTime(text) => write!(f, "{}", text),
            Value::Base64(data) => write!(f, "<{} bytes>", data.len()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Struct(members) => {
                write!(f, "{{")?;
                for (idx, (name, member)) in members.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, member)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Opaque search filter passed through to the server untouched.
///
/// Only two filters are ever built locally: the empty domain (match
/// everything) and `id in <ids>` used by the batch fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain(Value);

impl Domain {
    /// Empty domain, matching every record of a model.
    pub fn all() -> Self {
        Domain(Value::Array(Vec::new()))
    }

    /// `[["id", "in", ids]]`
    pub fn ids_in(ids: &[i64]) -> Self {
        Domain(Value::Array(vec![Value::Array(vec![
            Value::from("id"),
            Value::from("in"),
            Value::id_list(ids),
        ])]))
    }

    /// Wraps an already-built filter expression.
    pub fn from_value(value: Value) -> Self {
        Domain(value)
    }

    /// Returns the wrapped expression.
    #[inline]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the domain, returning the wrapped expression.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl Default for Domain {
    fn default() -> Self {
        Domain::all()
    }
}

impl From<serde_json::Value> for Domain {
    fn from(value: serde_json::Value) -> Self {
        Domain(Value::from(value))
    }
}

impl From<Vec<Value>> for Domain {
    fn from(terms: Vec<Value>) -> Self {
        Domain(Value::Array(terms))
    }
}
