//! Function calls
//!
//! Builtins form a closed, static table. User-defined functions are the one
//! open extension point: they are resolved by name through the
//! [`FunctionRegistry`] of the evaluating context.

mod builtins;

use crate::context::Context;
use crate::error::{EvalError, EvalResult};
use docql_value::{Scope, Value, ValueType};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use builtins::BUILTINS;

/// Implementation signature of a builtin
pub type BuiltinFn = fn(&[Value], &Scope<'_>, &dyn Context) -> EvalResult<Value>;

/// Static result type of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Fixed(ValueType),
    /// Same type as the first operand
    FirstArg,
    /// Common type of all operands
    CommonArgs,
    Json,
}

/// Entry of the builtin table
pub struct BuiltinFunction {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub commutative: bool,
    pub volatile: bool,
    pub conditional: bool,
    pub propagates_missing: bool,
    pub propagates_null: bool,
    pub result: ResultType,
    pub eval: BuiltinFn,
}

impl BuiltinFunction {
    pub fn check_arity(&self, found: usize) -> EvalResult<()> {
        let ok = found >= self.min_args && self.max_args.is_none_or(|max| found <= max);
        if ok {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        };
        Err(EvalError::arity_mismatch(self.name, expected, found))
    }
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinFunction")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

static BY_NAME: Lazy<HashMap<&'static str, &'static BuiltinFunction>> =
    Lazy::new(|| BUILTINS.iter().map(|f| (f.name, f)).collect());

/// Look up a builtin, ignoring case
pub fn lookup(name: &str) -> Option<&'static BuiltinFunction> {
    BY_NAME.get(name.to_lowercase().as_str()).copied()
}

/// What a call node invokes
#[derive(Debug, Clone)]
pub enum FunctionTarget {
    Builtin(&'static BuiltinFunction),
    /// Lowercased name resolved through the context registry
    User(String),
}

impl FunctionTarget {
    /// Picks one of its operands, like `IFMISSING`
    pub fn is_conditional(&self) -> bool {
        match self {
            Self::Builtin(f) => f.conditional,
            Self::User(_) => false,
        }
    }

    /// User functions are opaque, so never folded
    pub fn is_volatile(&self) -> bool {
        match self {
            Self::Builtin(f) => f.volatile,
            Self::User(_) => true,
        }
    }

    /// Operand order does not matter for equivalence
    pub fn is_commutative(&self) -> bool {
        matches!(self, Self::Builtin(f) if f.commutative)
    }

    /// Any MISSING argument makes the call MISSING
    pub fn propagates_missing(&self) -> bool {
        matches!(self, Self::Builtin(f) if f.propagates_missing)
    }

    pub fn propagates_null(&self) -> bool {
        matches!(self, Self::Builtin(f) if f.propagates_null)
    }

    pub fn result_type(&self) -> ResultType {
        match self {
            Self::Builtin(f) => f.result,
            Self::User(_) => ResultType::Json,
        }
    }

    /// Run the target on already-evaluated operands
    pub fn invoke(&self, args: &[Value], item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
        match self {
            Self::Builtin(f) => {
                if f.propagates_missing && args.iter().any(Value::is_missing) {
                    return Ok(Value::Missing);
                }
                if f.propagates_null && args.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                (f.eval)(args, item, ctx)
            }
            Self::User(name) => {
                let function = ctx
                    .functions()
                    .get(name)
                    .ok_or_else(|| EvalError::undefined_function(name.as_str()))?;
                function.evaluate(args, ctx)
            }
        }
    }
}

/// A function supplied by the embedding application
pub trait UserFunction: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, args: &[Value], ctx: &dyn Context) -> EvalResult<Value>;
}

/// User-defined functions, keyed by lowercased name
#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn UserFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function; a builtin with the same name still takes precedence
    pub fn register(&mut self, function: Arc<dyn UserFunction>) {
        self.functions.insert(function.name().to_lowercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn UserFunction>> {
        self.functions.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
