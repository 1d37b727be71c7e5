//! The value domain
//!
//! Values are ordered MISSING < NULL < booleans < numbers < strings < arrays
//! < objects. MISSING means "absent" and is distinct from an explicit NULL;
//! both are ordinary values, never errors.

use crate::{Number, ValueType};
use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Object fields in insertion order
pub type Object = IndexMap<String, Value>;

/// A JSON-like value extended with MISSING
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Missing,
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

/// Outcome of a three-valued comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// One side was MISSING
    Missing,
    /// One side was NULL (and neither was MISSING)
    Null,
    Order(Ordering),
}

impl Value {
    // ========================================================================
    // Constructors
    // ========================================================================

    pub const TRUE: Value = Value::Boolean(true);
    pub const FALSE: Value = Value::Boolean(false);

    pub fn int(i: i64) -> Self {
        Self::Number(Number::Int(i))
    }

    pub fn float(f: f64) -> Self {
        Self::Number(Number::Float(f))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(items.into_iter().collect())
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    // ========================================================================
    // Type inspection
    // ========================================================================

    /// Collation class of the value
    pub fn type_of(&self) -> ValueType {
        match self {
            Self::Missing => ValueType::Missing,
            Self::Null => ValueType::Null,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Number(_) => ValueType::Number,
            Self::String(_) => ValueType::String,
            Self::Array(_) => ValueType::Array,
            Self::Object(_) => ValueType::Object,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// MISSING or NULL
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Missing | Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view; no conversion from strings
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Truthiness used by WHERE/WHEN/SATISFIES
    ///
    /// MISSING, NULL, false, 0, NaN, "", [] and {} are false.
    pub fn truth(&self) -> bool {
        match self {
            Self::Missing | Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Number(n) => !n.is_zero() && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Array(a) => !a.is_empty(),
            Self::Object(o) => !o.is_empty(),
        }
    }

    // ========================================================================
    // Ordering and equality
    // ========================================================================

    /// Total collation order across all values
    pub fn collate(&self, other: &Value) -> Ordering {
        let (lt, rt) = (self.type_of(), other.type_of());
        if lt != rt {
            return lt.cmp(&rt);
        }

        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.collate(*b),
            (Self::String(a), Self::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.collate(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Object(a), Self::Object(b)) => collate_objects(a, b),
            _ => Ordering::Equal,
        }
    }

    /// Three-valued equality: MISSING, then NULL, then a boolean
    pub fn equals(&self, other: &Value) -> Value {
        match self.compare(other) {
            Comparison::Missing => Value::Missing,
            Comparison::Null => Value::Null,
            Comparison::Order(ord) => Value::Boolean(ord == Ordering::Equal),
        }
    }

    /// Three-valued comparison
    pub fn compare(&self, other: &Value) -> Comparison {
        if self.is_missing() || other.is_missing() {
            Comparison::Missing
        } else if self.is_null() || other.is_null() {
            Comparison::Null
        } else {
            Comparison::Order(self.collate(other))
        }
    }

    /// Identity under collation; MISSING is equivalent to MISSING
    pub fn equivalent(&self, other: &Value) -> bool {
        self.collate(other) == Ordering::Equal
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Borrow a field of an object
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Object(o) => o.get(name),
            _ => None,
        }
    }

    /// Borrow a field, matching the name without regard to case
    pub fn get_field_ci(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Object(o) => o.get(name).or_else(|| {
                let lower = name.to_lowercase();
                o.iter()
                    .find(|(k, _)| k.to_lowercase() == lower)
                    .map(|(_, v)| v)
            }),
            _ => None,
        }
    }

    /// Field value, MISSING when absent or not an object
    pub fn field(&self, name: &str) -> Value {
        self.get_field(name).cloned().unwrap_or_default()
    }

    /// Like [`Value::field`], matching the name without regard to case
    pub fn field_ci(&self, name: &str) -> Value {
        self.get_field_ci(name).cloned().unwrap_or_default()
    }

    /// Array element; negative positions count from the end
    pub fn index(&self, i: i64) -> Value {
        let Self::Array(items) = self else {
            return Value::Missing;
        };
        let len = items.len() as i64;
        let pos = if i < 0 { len + i } else { i };
        if pos < 0 || pos >= len {
            return Value::Missing;
        }
        items[pos as usize].clone()
    }

    /// Sub-array `[start, end)`; NULL when the bounds fall outside the array
    pub fn slice(&self, start: i64, end: Option<i64>) -> Value {
        let Self::Array(items) = self else {
            return Value::Missing;
        };
        let len = items.len() as i64;
        let norm = |i: i64| if i < 0 { len + i } else { i };
        let (start, end) = (norm(start), end.map_or(len, norm));
        if start < 0 || end > len || start > end {
            return Value::Null;
        }
        Value::Array(items[start as usize..end as usize].to_vec())
    }

    /// All nested values, depth first; object fields in name order
    pub fn descendants(&self, out: &mut Vec<Value>) {
        match self {
            Self::Array(items) => {
                for item in items {
                    out.push(item.clone());
                    item.descendants(out);
                }
            }
            Self::Object(fields) => {
                let mut names: Vec<&String> = fields.keys().collect();
                names.sort();
                for name in names {
                    if let Some(v) = fields.get(name) {
                        out.push(v.clone());
                        v.descendants(out);
                    }
                }
            }
            _ => {}
        }
    }

    // ========================================================================
    // JSON conversion
    // ========================================================================

    /// JSON `null` becomes NULL; nothing converts to MISSING
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::int(i),
                None => Self::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(a) => Self::Array(a.into_iter().map(Self::from_json).collect()),
            serde_json::Value::Object(o) => {
                Self::Object(o.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Convert to JSON; MISSING becomes `null` and missing fields are dropped
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Missing | Self::Null => serde_json::Value::Null,
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Number(Number::Int(i)) => serde_json::Value::from(*i),
            Self::Number(Number::Float(f)) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(a) => serde_json::Value::Array(a.iter().map(Self::to_json).collect()),
            Self::Object(o) => serde_json::Value::Object(
                o.iter()
                    .filter(|(_, v)| !v.is_missing())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn collate_objects(a: &Object, b: &Object) -> Ordering {
    match a.len().cmp(&b.len()) {
        Ordering::Equal => {}
        ord => return ord,
    }

    let mut ak: Vec<&String> = a.keys().collect();
    let mut bk: Vec<&String> = b.keys().collect();
    ak.sort();
    bk.sort();

    match ak.cmp(&bk) {
        Ordering::Equal => {}
        ord => return ord,
    }

    for key in ak {
        if let (Some(x), Some(y)) = (a.get(key.as_str()), b.get(key.as_str())) {
            match x.collate(y) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
    }
    Ordering::Equal
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equivalent(other)
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.marshal())
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::float(f)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(json)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Missing | Self::Null => serializer.serialize_none(),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Number(Number::Int(i)) => serializer.serialize_i64(*i),
            Self::Number(Number::Float(f)) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(None)?;
                for (k, v) in fields.iter().filter(|(_, v)| !v.is_missing()) {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from_json)
    }
}
