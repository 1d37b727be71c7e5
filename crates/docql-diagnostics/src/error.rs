//! Front-end error types

use crate::{ErrorCode, SourceLocation, Span};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

/// A reportable message: what went wrong, where, and a hint if one exists
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub help: Option<&'static str>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " at {}:{}", loc.line, loc.column)?;
        }
        Ok(())
    }
}

/// Errors raised while turning text into expression trees or loading settings
#[derive(Debug, Clone, Error)]
pub enum DocqlError {
    /// The expression text does not parse
    #[error("{code}: {message}")]
    Parse {
        code: ErrorCode,
        message: String,
        /// Full text that was being parsed
        expression: String,
        location: Option<SourceLocation>,
    },

    /// Invalid engine settings
    #[error("{code}: {message}")]
    Config { code: ErrorCode, message: String },
}

impl DocqlError {
    /// Parse error positioned at `span` within `expression`
    pub fn parse_at(
        code: ErrorCode,
        message: impl Into<String>,
        expression: impl Into<String>,
        span: Span,
    ) -> Self {
        let expression = expression.into();
        Self::Parse {
            code,
            message: message.into(),
            location: Some(SourceLocation::from_span(span, &expression)),
            expression,
        }
    }

    pub fn config(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { code, .. } | Self::Config { code, .. } => *code,
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::Parse { location, .. } => location.as_ref(),
            Self::Config { .. } => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let (code, message) = match self {
            Self::Parse { code, message, .. } | Self::Config { code, message } => (*code, message),
        };
        Diagnostic {
            severity: Severity::Error,
            code,
            message: message.clone(),
            location: self.location().cloned(),
            help: code.info().help,
        }
    }
}
