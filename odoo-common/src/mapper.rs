//! # Record Mapper
//!
//! Purpose: Turn untyped remote records into typed structs through an
//! explicit field table instead of runtime reflection.
//!
//! ## Design Principles
//!
//! 1. **Declarative Schema**: each record type lists `(field name, kind)`
//!    pairs once; the same table drives the field projection sent to the
//!    server, decoding and printing.
//! 2. **Weak Typing In, Strong Typing Out**: numbers may arrive as strings or
//!    floats, booleans as `0/1` or `"true"/"false"`, and the server reports
//!    empty fields as `false`. All of these coerce to the declared kind.
//! 3. **Zero Defaults**: missing fields take the kind's zero value; unknown
//!    fields are ignored.
//! 4. **Named Failures**: a value that cannot be coerced yields a
//!    `MappingError` carrying the field name.
//!
//! ## Coercion Table
//!
//! ```text
//!            | int      | double    | bool   | string      | nil | [id, name]
//! -----------+----------+-----------+--------+-------------+-----+-----------
//! Integer    | as is    | truncated | 0 / 1  | parsed      | 0   | id
//! Float      | widened  | as is     | 0 / 1  | parsed      | 0   | error
//! Boolean    | != 0     | != 0      | as is  | 1/0/true/.. | no  | error
//! Text       | decimal  | decimal   | ""/true| as is       | ""  | name
//! ```

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::MappingError;
use crate::types::{RemoteRecord, Value};

/// Target kind of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Integer,
    Float,
    Boolean,
    Text,
}

impl FieldKind {
    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Text => "text",
        }
    }

    /// Value taken by a field absent from the remote record.
    pub fn zero(self) -> FieldValue {
        match self {
            FieldKind::Integer => FieldValue::Integer(0),
            FieldKind::Float => FieldValue::Float(0.0),
            FieldKind::Boolean => FieldValue::Boolean(false),
            FieldKind::Text => FieldValue::Text(String::new()),
        }
    }
}

/// One row of a record schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn integer(name: &'static str) -> Self {
        FieldSpec {
            name,
            kind: FieldKind::Integer,
        }
    }

    pub const fn float(name: &'static str) -> Self {
        FieldSpec {
            name,
            kind: FieldKind::Float,
        }
    }

    pub const fn boolean(name: &'static str) -> Self {
        FieldSpec {
            name,
            kind: FieldKind::Boolean,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        FieldSpec {
            name,
            kind: FieldKind::Text,
        }
    }
}

/// A coerced field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(value) => write!(f, "{}", value),
            FieldValue::Float(value) => write!(f, "{}", value),
            FieldValue::Boolean(value) => write!(f, "{}", value),
            FieldValue::Text(value) => write!(f, "{}", value),
        }
    }
}

/// Coerced values of one record, keyed by schema field name.
///
/// Record constructors take values out by name; every schema field is
/// present, so the getters only fall back to zero on a schema typo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRow {
    values: BTreeMap<&'static str, FieldValue>,
}

impl DecodedRow {
    pub fn integer(&mut self, name: &str) -> i64 {
        match self.values.remove(name) {
            Some(FieldValue::Integer(value)) => value,
            _ => 0,
        }
    }

    pub fn float(&mut self, name: &str) -> f64 {
        match self.values.remove(name) {
            Some(FieldValue::Float(value)) => value,
            _ => 0.0,
        }
    }

    pub fn boolean(&mut self, name: &str) -> bool {
        match self.values.remove(name) {
            Some(FieldValue::Boolean(value)) => value,
            _ => false,
        }
    }

    pub fn text(&mut self, name: &str) -> String {
        match self.values.remove(name) {
            Some(FieldValue::Text(value)) => value,
            _ => String::new(),
        }
    }
}

/// A statically typed record backed by a model on the server.
pub trait Record: Sized + Send + 'static {
    /// Technical model name, e.g. `res.partner`.
    const MODEL: &'static str;

    /// Fields read from the server and their target kinds.
    const SCHEMA: &'static [FieldSpec];

    /// Builds the record from a row decoded against `SCHEMA`.
    fn from_row(row: DecodedRow) -> Self;

    /// Field values in `SCHEMA` order.
    fn to_row(&self) -> Vec<FieldValue>;
}

/// Field projection for a record type, in schema order.
pub fn field_names<R: Record>() -> Vec<String> {
    R::SCHEMA.iter().map(|spec| spec.name.to_string()).collect()
}

/// Maps one remote record into `R`.
pub fn map_record<R: Record>(remote: &RemoteRecord) -> Result<R, MappingError> {
    decode_row(remote, R::SCHEMA).map(R::from_row)
}

/// Coerces every schema field of `remote`, ignoring fields outside the schema.
pub fn decode_row(remote: &RemoteRecord, schema: &[FieldSpec]) -> Result<DecodedRow, MappingError> {
    let mut values = BTreeMap::new();
    for spec in schema {
        let value = match remote.get(spec.name) {
            Some(value) => coerce(spec.name, spec.kind, value)?,
            None => spec.kind.zero(),
        };
        values.insert(spec.name, value);
    }
    Ok(DecodedRow { values })
}

/// Coerces a single value into `kind`.
pub fn coerce(field: &str, kind: FieldKind, value: &Value) -> Result<FieldValue, MappingError> {
    let coerced = match kind {
        FieldKind::Integer => to_integer(value).map(FieldValue::Integer),
        FieldKind::Float => to_float(value).map(FieldValue::Float),
        FieldKind::Boolean => to_boolean(value).map(FieldValue::Boolean),
        FieldKind::Text => to_text(value).map(FieldValue::Text),
    };
    coerced.ok_or_else(|| MappingError {
        field: field.to_string(),
        expected: kind.name(),
        found: describe_value(value),
    })
}

/// Renders a record as `-----` framed `field: value` lines.
pub fn describe<R: Record>(record: &R) -> String {
    let mut out = String::from("-----\n");
    for (spec, value) in R::SCHEMA.iter().zip(record.to_row()) {
        out.push_str(spec.name);
        out.push_str(": ");
        out.push_str(&value.to_string());
        out.push('\n');
    }
    out.push_str("-----");
    out
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(int) => Some(*int),
        Value::Double(double) if double.is_finite() => Some(double.trunc() as i64),
        Value::Bool(flag) => Some(*flag as i64),
        Value::Nil => Some(0),
        Value::String(text) => parse_integer(text),
        Value::Array(items) => many2one(items).map(|(id, _)| id),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Double(double) => Some(*double),
        Value::Int(int) => Some(*int as f64),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Nil => Some(0.0),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Some(0.0);
            }
            text.parse::<f64>().ok()
        }
        _ => None,
    }
}

fn to_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Int(int) => Some(*int != 0),
        Value::Double(double) => Some(*double != 0.0),
        Value::Nil => Some(false),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" => Some(true),
            "" | "0" | "f" | "false" | "n" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) | Value::DateTime(text) => Some(text.clone()),
        Value::Int(int) => Some(int.to_string()),
        Value::Double(double) => Some(double.to_string()),
        // The server sends `false` for an empty char/date field.
        Value::Bool(false) | Value::Nil => Some(String::new()),
        Value::Bool(true) => Some("true".to_string()),
        Value::Base64(data) => Some(BASE64.encode(data)),
        Value::Array(items) => many2one(items).map(|(_, name)| name.to_string()),
        Value::Struct(_) => None,
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0);
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(int);
    }
    match text.parse::<f64>() {
        Ok(double) if double.is_finite() => Some(double.trunc() as i64),
        _ => None,
    }
}

/// `[id, "display name"]` pairs returned for relational fields.
fn many2one(items: &[Value]) -> Option<(i64, &str)> {
    match items {
        [Value::Int(id), Value::String(name)] => Some((*id, name.as_str())),
        _ => None,
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::String(text) => format!("string {:?}", text),
        Value::Array(items) => format!("array of {} items", items.len()),
        other => other.kind().to_string(),
    }
}
