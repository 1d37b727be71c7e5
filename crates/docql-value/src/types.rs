//! Value types in collation order

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a value, ordered the way values of different types collate.
///
/// `Json` never describes a runtime value; it is the static fallback used
/// when an expression's result type cannot be known without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Missing,
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
    Json,
}

impl ValueType {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Json => "json",
        }
    }

    /// MISSING or NULL
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Missing | Self::Null)
    }

    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::Array | Self::Object)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
