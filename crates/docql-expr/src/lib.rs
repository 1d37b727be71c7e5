//! docql expression core
//!
//! The expression layer of a document query engine: a tree of typed nodes
//! evaluated against JSON-like items, plus the static analyses a planner
//! runs over those trees.
//!
//! - **Node model**: [`Expression`] wraps a closed [`ExprKind`] with flags, a
//!   memoized constant value and a source span
//! - **Evaluation**: MISSING/NULL propagation, three-valued logic, the
//!   collection engine behind ANY/EVERY/ARRAY/OBJECT and IN/WITHIN, with
//!   per-context hash tables for long static IN lists
//! - **Analysis**: structural equivalence, dependency, index coverage
//! - **Rewriting**: renaming and inlining of variables, negation normal
//!   form, constant removal, keyspace qualification
//! - **Text form**: a canonical, re-parseable rendering used for display and
//!   as a structural key
//!
//! # Example
//!
//! ```ignore
//! use docql_expr::{Binding, ExecutionContext, Expression};
//! use docql_value::{Scope, Value};
//!
//! let any = Expression::any(
//!     Binding::new("v", Expression::identifier("xs")).into(),
//!     Expression::greater_than(Expression::identifier("v"), Expression::constant(2)),
//! );
//! let doc = Value::object([("xs", Value::array([Value::int(1), Value::int(3)]))]);
//! let ctx = ExecutionContext::new();
//! assert_eq!(any.evaluate(&Scope::new(&doc), &ctx)?, Value::TRUE);
//! ```

pub mod binding;
pub mod config;
pub mod context;
pub mod coverage;
pub mod equivalence;
pub mod error;
pub mod eval;
pub mod expression;
pub mod flags;
pub mod functions;
pub mod inlist;
pub mod pool;
pub mod privileges;
mod stringer;
pub mod transform;

pub use binding::{Binding, BindingVarOptions, Bindings, Renaming};
pub use config::EngineConfig;
pub use context::{Context, ExecutionContext, ExecutionContextBuilder, SubqueryExecutor, SubqueryPlan, compile_like};
pub use coverage::{CoveredOptions, CoveredResult, expand_flatten_keys, filter_covers, is_array_covered, is_covered};
pub use equivalence::{copy_expressions, equivalent, equivalent_coll_map, equivalent_coll_pred, equivalents};
pub use error::{EvalError, EvalResult};
pub use expression::{
    AllExpr, CollMap, CollPred, CoverExpr, ExprKind, Expression, FunctionCall, InList, NodeId, ObjectMap, WhenTerm,
};
pub use flags::Flags;
pub use functions::{BuiltinFunction, FunctionRegistry, FunctionTarget, UserFunction};
pub use inlist::{HashTable, InlistHash, InlistHashes, InlistRef};
pub use pool::{Pool, Pooled, Pools, Reusable};
pub use privileges::{Privilege, Privileges};
