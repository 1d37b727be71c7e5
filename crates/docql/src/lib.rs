//! Expression core of a document query engine
//!
//! This crate bundles the docql workspace behind one dependency:
//! - Parsing the canonical expression text
//! - Evaluating expressions against JSON-like documents
//! - Index coverage, equivalence and the planner rewrites
//! - The `docql` command-line tool (with the `cli` feature)
//!
//! # Example
//!
//! ```ignore
//! use docql::{ExecutionContext, Value, evaluate};
//!
//! let doc = Value::from(serde_json::json!({"tags": ["a", "b"]}));
//! let result = evaluate("any t in tags satisfies t = 'b' end", &doc, &ExecutionContext::new())?;
//! assert_eq!(result, Value::TRUE);
//! ```

pub use docql_diagnostics as diagnostics;
pub use docql_expr as expr;
pub use docql_parser as parser;
pub use docql_value as value;

pub use docql_diagnostics::{DocqlError, ErrorCode, Span};
pub use docql_expr::{
    Binding, Bindings, CoveredOptions, CoveredResult, EngineConfig, EvalError, ExecutionContext,
    Expression,
};
pub use docql_parser::{parse_expression as parse, parse_expressions};
pub use docql_value::{Scope, Value};

#[cfg(feature = "cli")]
pub mod cli;

use thiserror::Error;

/// Failure of a text-in, value-out evaluation
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] DocqlError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Parse `source` and evaluate it with `item` as the base document
pub fn evaluate(source: &str, item: &Value, ctx: &ExecutionContext) -> Result<Value, Error> {
    let expr = parse(source)?;
    Ok(expr.evaluate(&Scope::new(item), ctx)?)
}

/// Whether the index keys in `keys` supply every document reference of
/// `source` under `keyspace`
pub fn covered(source: &str, keyspace: &str, keys: &str, array: bool) -> Result<CoveredResult, Error> {
    let expr = parse(source)?;
    let keys = parse_expressions(keys)?;
    let mut options = CoveredOptions::TRICKLE;
    if array {
        options = options | CoveredOptions::ARRAY_KEY;
    }
    Ok(expr.covered_by(keyspace, &keys, options))
}
