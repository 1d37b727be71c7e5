//! Numbers that keep integers exact and fall back to floats

use std::cmp::Ordering;
use std::fmt;

/// Largest magnitude at which every integer is exactly representable as f64
const EXACT_FLOAT_LIMIT: f64 = 9_007_199_254_740_992.0;

/// A JSON number
///
/// Integers stay `Int` through arithmetic until they overflow or divide
/// unevenly; comparisons treat `Int(1)` and `Float(1.0)` as equal.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Lossy above 2^53 for integers
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    /// Integer view, if the number is integral and in range
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i),
            Self::Float(f) if f.fract() == 0.0 && f.abs() < EXACT_FLOAT_LIMIT => Some(f as i64),
            Self::Float(_) => None,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Self::Int(i) => i == 0,
            Self::Float(f) => f == 0.0,
        }
    }

    pub fn is_nan(self) -> bool {
        matches!(self, Self::Float(f) if f.is_nan())
    }

    /// Total order; NaN sorts below every other number
    pub fn collate(self, other: Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(&b),
            _ => {
                let (a, b) = (self.as_f64(), other.as_f64());
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                }
            }
        }
    }

    /// Integer sum, or a float once it overflows
    pub fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(b)
                .map_or(Self::Float(a as f64 + b as f64), Self::Int),
            _ => Self::Float(self.as_f64() + other.as_f64()),
        }
    }

    pub fn sub(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_sub(b)
                .map_or(Self::Float(a as f64 - b as f64), Self::Int),
            _ => Self::Float(self.as_f64() - other.as_f64()),
        }
    }

    pub fn mul(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_mul(b)
                .map_or(Self::Float(a as f64 * b as f64), Self::Int),
            _ => Self::Float(self.as_f64() * other.as_f64()),
        }
    }

    /// Division; `None` when dividing by zero
    pub fn div(self, other: Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        match (self, other) {
            (Self::Int(a), Self::Int(b)) if b != 0 && a.checked_rem(b) == Some(0) => {
                Some(a.checked_div(b).map_or(Self::Float(a as f64 / b as f64), Self::Int))
            }
            _ => Some(Self::Float(self.as_f64() / other.as_f64())),
        }
    }

    /// Remainder; `None` when dividing by zero
    pub fn rem(self, other: Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.checked_rem(b).map_or(Self::Int(0), Self::Int)),
            _ => Some(Self::Float(self.as_f64() % other.as_f64())),
        }
    }

    pub fn neg(self) -> Self {
        match self {
            Self::Int(i) => i.checked_neg().map_or(Self::Float(-(i as f64)), Self::Int),
            Self::Float(f) => Self::Float(-f),
        }
    }

    pub fn abs(self) -> Self {
        match self {
            Self::Int(i) => i.checked_abs().map_or(Self::Float((i as f64).abs()), Self::Int),
            Self::Float(f) => Self::Float(f.abs()),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.collate(*other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = String::new();
        crate::marshal::write_number(*self, &mut buf);
        f.write_str(&buf)
    }
}
