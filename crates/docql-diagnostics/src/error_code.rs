//! Structured error codes
//!
//! - DQL0001-DQL0099: lexical and syntax errors
//! - DQL0100-DQL0199: well-formed text that cannot become a tree
//! - DQL0400-DQL0499: settings and environment

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ErrorCode(u16);

/// What a code means, and how to fix it when that is not obvious
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub description: &'static str,
    pub help: Option<&'static str>,
}

pub const DQL0001: ErrorCode = ErrorCode(1);
pub const DQL0002: ErrorCode = ErrorCode(2);
pub const DQL0005: ErrorCode = ErrorCode(5);
pub const DQL0006: ErrorCode = ErrorCode(6);
pub const DQL0007: ErrorCode = ErrorCode(7);
pub const DQL0008: ErrorCode = ErrorCode(8);
pub const DQL0009: ErrorCode = ErrorCode(9);
pub const DQL0010: ErrorCode = ErrorCode(10);
pub const DQL0011: ErrorCode = ErrorCode(11);
pub const DQL0012: ErrorCode = ErrorCode(12);
pub const DQL0101: ErrorCode = ErrorCode(101);
pub const DQL0102: ErrorCode = ErrorCode(102);
pub const DQL0402: ErrorCode = ErrorCode(402);

const fn info(code: ErrorCode, description: &'static str, help: Option<&'static str>) -> ErrorInfo {
    ErrorInfo {
        code,
        description,
        help,
    }
}

/// Every registered code, in numeric order
pub static ERROR_CODES: &[ErrorInfo] = &[
    info(DQL0001, "Unexpected token", None),
    info(DQL0002, "Unexpected end of input", None),
    info(DQL0005, "Invalid string escape sequence", Some("Supported escapes: \\\\ \\\" \\' \\/ \\b \\f \\n \\r \\t \\uXXXX")),
    info(DQL0006, "Unterminated string literal", None),
    info(DQL0007, "Invalid number format", None),
    info(DQL0008, "Missing closing delimiter", None),
    info(DQL0009, "Expected expression", Some("Reserved words must be quoted with backticks to be used as names")),
    info(DQL0010, "Expected identifier", None),
    info(
        DQL0011,
        "Invalid collection binding",
        Some("Bindings take the form `var IN expr` or `name : var WITHIN expr`"),
    ),
    info(DQL0012, "Invalid case expression", Some("CASE needs at least one WHEN ... THEN and a closing END")),
    info(DQL0101, "Invalid argument count", None),
    info(DQL0102, "Duplicate binding variable", None),
    info(DQL0402, "Configuration error", None),
];

static UNKNOWN: ErrorInfo = info(ErrorCode(0), "Unknown error", None);

impl ErrorCode {
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn code(&self) -> u16 {
        self.0
    }

    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_CODES
            .binary_search_by_key(self, |i| i.code)
            .map_or(&UNKNOWN, |pos| &ERROR_CODES[pos])
    }

    pub const fn is_syntax(&self) -> bool {
        self.0 >= 1 && self.0 < 100
    }

    pub const fn is_config(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DQL{:04}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DQL0001.to_string(), "DQL0001");
        assert_eq!(DQL0402.to_string(), "DQL0402");
    }

    #[test]
    fn test_table_is_sorted() {
        assert!(ERROR_CODES.windows(2).all(|w| w[0].code < w[1].code));
    }

    #[test]
    fn test_info_lookup() {
        assert_eq!(DQL0006.info().description, "Unterminated string literal");
        assert!(DQL0011.info().help.is_some());
        assert_eq!(ErrorCode::new(999).info().description, "Unknown error");
        assert!(!DQL0102.is_syntax() && DQL0402.is_config());
    }
}
