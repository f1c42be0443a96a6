//! Typed field values.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// The declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Int,
    Float,
    Str,
    Bool,
    /// Unordered set of strings, e.g. CPU flags.
    Set,
    /// Ordered list of integers, e.g. CPU lists.
    IntList,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Str => "str",
            FieldKind::Bool => "bool",
            FieldKind::Set => "set",
            FieldKind::IntList => "intlist",
        };
        f.write_str(name)
    }
}

/// A populated field value.
///
/// `Unavailable` is the value of any field whose source could not be read or
/// whose text did not convert. It serializes as `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Set(BTreeSet<String>),
    IntList(Vec<i64>),
    Unavailable,
}

impl Value {
    /// Kind of an available value.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Value::Int(_) => Some(FieldKind::Int),
            Value::Float(_) => Some(FieldKind::Float),
            Value::Str(_) => Some(FieldKind::Str),
            Value::Bool(_) => Some(FieldKind::Bool),
            Value::Set(_) => Some(FieldKind::Set),
            Value::IntList(_) => Some(FieldKind::IntList),
            Value::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Value::Unavailable)
    }

    /// Numeric view used by tolerant comparison.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Set(items.into_iter().map(Into::into).collect())
    }

    /// JSON representation of the value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.clone()),
            Value::Bool(b) => Json::Bool(*b),
            Value::Set(items) => Json::Array(items.iter().cloned().map(Json::String).collect()),
            Value::IntList(items) => Json::Array(items.iter().copied().map(Json::from).collect()),
            Value::Unavailable => Json::Null,
        }
    }

    /// Reads a JSON leaf back as a value of `kind`.
    ///
    /// `null` and values that do not fit `kind` read back as `Unavailable`.
    pub fn from_json(kind: FieldKind, json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match (kind, json) {
            (FieldKind::Int, Json::Number(n)) => match n.as_i64() {
                Some(i) => Value::Int(i),
                // Floats stored for an int field still compare numerically
                None => n.as_f64().map_or(Value::Unavailable, Value::Float),
            },
            (FieldKind::Float, Json::Number(n)) => {
                n.as_f64().map_or(Value::Unavailable, Value::Float)
            }
            (FieldKind::Str, Json::String(s)) => Value::Str(s.clone()),
            (FieldKind::Bool, Json::Bool(b)) => Value::Bool(*b),
            (FieldKind::Set, Json::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<BTreeSet<_>>>()
                .map_or(Value::Unavailable, Value::Set),
            (FieldKind::IntList, Json::Array(items)) => items
                .iter()
                .map(serde_json::Value::as_i64)
                .collect::<Option<Vec<_>>>()
                .map_or(Value::Unavailable, Value::IntList),
            _ => Value::Unavailable,
        }
    }

    /// Reads a JSON leaf whose kind is not declared anywhere.
    pub fn infer(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Number(n) if n.is_i64() => Value::from_json(FieldKind::Int, json),
            Json::Number(_) => Value::from_json(FieldKind::Float, json),
            Json::String(s) => Value::Str(s.clone()),
            Json::Bool(b) => Value::Bool(*b),
            Json::Array(items) if items.iter().all(Json::is_i64) => {
                Value::from_json(FieldKind::IntList, json)
            }
            Json::Array(_) => Value::from_json(FieldKind::Set, json),
            Json::Null | Json::Object(_) => Value::Unavailable,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Set(items) => {
                let items: Vec<&str> = items.iter().map(String::as_str).collect();
                f.write_str(&items.join(", "))
            }
            Value::IntList(items) => {
                let items: Vec<String> = items.iter().map(i64::to_string).collect();
                f.write_str(&items.join(", "))
            }
            Value::Unavailable => f.write_str("unavailable"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
