//! Evaluation errors
//!
//! MISSING and NULL are values, not errors; these variants cover the cases
//! where evaluation cannot produce a value at all.

use docql_value::ValueType;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Conditions that abort the current evaluation
#[derive(Debug, Error, Clone)]
pub enum EvalError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Operand the operator cannot work with at all (not merely NULL-producing)
    #[error("Invalid operand for {operator}: {message}")]
    InvalidOperand { operator: String, message: String },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },

    #[error("Function {name} expects {expected} arguments, found {found}")]
    ArityMismatch {
        name: String,
        expected: String,
        found: usize,
    },

    /// Invalid LIKE or regular expression pattern
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// IN-list hash table could not be built
    #[error("IN list hash build failed: {message}")]
    HashBuild { message: String },

    /// Subquery execution failed or no executor is available
    #[error("Subquery error: {message}")]
    Subquery { message: String },

    /// Renaming binding variables would capture another variable
    #[error("Binding variable conflict: {message}")]
    BindingConflict { message: String },

    /// Identifier cannot be qualified with a keyspace
    #[error("Ambiguous reference to {name}")]
    AmbiguousReference { name: String },

    /// Maximum nesting depth exceeded
    #[error("Maximum recursion depth {limit} exceeded")]
    RecursionLimit { limit: usize },

    /// Broken invariant inside the engine
    #[error("Internal evaluation error: {message}")]
    Internal { message: String },
}

impl EvalError {
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn type_mismatch_value(expected: ValueType, found: ValueType) -> Self {
        Self::type_mismatch(expected.name(), found.name())
    }

    pub fn invalid_operand(operator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOperand {
            operator: operator.into(),
            message: message.into(),
        }
    }

    pub fn undefined_function(name: impl Into<String>) -> Self {
        Self::UndefinedFunction { name: name.into() }
    }

    pub fn arity_mismatch(name: impl Into<String>, expected: impl Into<String>, found: usize) -> Self {
        Self::ArityMismatch {
            name: name.into(),
            expected: expected.into(),
            found,
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    pub fn hash_build(message: impl Into<String>) -> Self {
        Self::HashBuild {
            message: message.into(),
        }
    }

    pub fn subquery(message: impl Into<String>) -> Self {
        Self::Subquery {
            message: message.into(),
        }
    }

    pub fn binding_conflict(message: impl Into<String>) -> Self {
        Self::BindingConflict {
            message: message.into(),
        }
    }

    pub fn ambiguous_reference(name: impl Into<String>) -> Self {
        Self::AmbiguousReference { name: name.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EvalError::arity_mismatch("decode", "at least 3", 2);
        assert_eq!(err.to_string(), "Function decode expects at least 3 arguments, found 2");

        let err = EvalError::type_mismatch_value(ValueType::Array, ValueType::String);
        assert_eq!(err.to_string(), "Type mismatch: expected array, found string");
    }
}
