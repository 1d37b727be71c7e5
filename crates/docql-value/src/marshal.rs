//! Canonical text form of values
//!
//! Object fields are written in sorted name order and integral floats are
//! written as integers, so two values that collate equal marshal to the
//! same text. The IN hash table keys on this text.

use crate::{Number, Value};
use std::fmt::Write;

/// Floats within the i64 range that have no fraction print as integers
const INTEGRAL_LIMIT: f64 = 9.223_372_036_854_775e18;

impl Value {
    /// Canonical JSON text; MISSING renders as the keyword `missing`
    pub fn marshal(&self) -> String {
        let mut out = String::new();
        self.marshal_into(&mut out);
        out
    }

    /// Append the canonical text to `out`, reusing its allocation
    pub fn marshal_into(&self, out: &mut String) {
        match self {
            Value::Missing => out.push_str("missing"),
            Value::Null => out.push_str("null"),
            Value::Boolean(true) => out.push_str("true"),
            Value::Boolean(false) => out.push_str("false"),
            Value::Number(n) => write_number(*n, out),
            Value::String(s) => write_string(s, out),
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.marshal_into(out);
                }
                out.push(']');
            }
            Value::Object(fields) => {
                let mut names: Vec<&String> = fields.keys().collect();
                names.sort();
                out.push('{');
                let mut first = true;
                for name in names {
                    let Some(v) = fields.get(name.as_str()) else {
                        continue;
                    };
                    if v.is_missing() {
                        continue;
                    }
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    write_string(name, out);
                    out.push(':');
                    v.marshal_into(out);
                }
                out.push('}');
            }
        }
    }
}

pub(crate) fn write_number(n: Number, out: &mut String) {
    match n {
        Number::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Number::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < INTEGRAL_LIMIT => {
            let _ = write!(out, "{}", f as i64);
        }
        Number::Float(f) => match serde_json::Number::from_f64(f) {
            Some(num) => {
                let _ = write!(out, "{num}");
            }
            None => out.push_str("null"),
        },
    }
}

/// JSON string literal with the mandatory escapes
pub fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
