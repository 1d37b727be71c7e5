//! Expression node model
//!
//! Every node is an `Expression`: a closed `ExprKind` variant plus the state
//! all nodes share (flags, the memoized constant value, the source span).
//! Children are owned by their parent; the tree is acyclic.

use crate::binding::{Binding, Bindings};
use crate::context::{SubqueryPlan, probe_context};
use crate::error::{EvalError, EvalResult};
use crate::flags::Flags;
use crate::functions::{self, FunctionTarget, ResultType};
use crate::privileges::Privileges;
use docql_diagnostics::Span;
use docql_value::{Scope, Value, ValueType};
use log::debug;
use once_cell::sync::OnceCell;
use smallvec::SmallVec;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Borrowed child list
pub type Children<'a> = SmallVec<[&'a Expression; 4]>;

/// Mutable child list
pub type ChildrenMut<'a> = SmallVec<[&'a mut Expression; 4]>;

/// Identity of a node within the process, used to key per-context state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Operands of `IN`; each copy of the node gets its own identity
#[derive(Debug)]
pub struct InList {
    id: NodeId,
    pub first: Box<Expression>,
    pub second: Box<Expression>,
}

impl InList {
    /// Process-unique identity, renewed on copy
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Clone for InList {
    fn clone(&self) -> Self {
        Self {
            id: NodeId::next(),
            first: self.first.clone(),
            second: self.second.clone(),
        }
    }
}

/// `WHEN ... THEN ...` arm of a CASE
#[derive(Debug, Clone)]
pub struct WhenTerm {
    pub when: Expression,
    pub then: Expression,
}

/// ANY / EVERY / ANY AND EVERY
#[derive(Debug, Clone)]
pub struct CollPred {
    pub bindings: Bindings,
    pub satisfies: Expression,
}

/// ARRAY / FIRST comprehension
#[derive(Debug, Clone)]
pub struct CollMap {
    pub mapping: Expression,
    pub bindings: Bindings,
    pub when: Option<Expression>,
}

/// OBJECT comprehension
#[derive(Debug, Clone)]
pub struct ObjectMap {
    pub name: Expression,
    pub value: Expression,
    pub bindings: Bindings,
    pub when: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub name: String,
    pub operands: Vec<Expression>,
    pub target: FunctionTarget,
}

/// Subexpression whose value is supplied by an index
#[derive(Debug, Clone)]
pub struct CoverExpr {
    pub covered: Expression,
    pub text: String,
}

/// Array index key over every element (`ALL`/`DISTINCT`)
#[derive(Debug, Clone)]
pub struct AllExpr {
    pub array: Expression,
    pub distinct: bool,
}

/// Node variants
///
/// Child order, as returned by [`Expression::children`], follows the field
/// order below; comprehensions list binding expressions first.
#[derive(Debug, Clone)]
pub enum ExprKind {
    // === Arithmetic ===
    Add(Vec<Expression>),
    Sub(Box<Expression>, Box<Expression>),
    Mult(Vec<Expression>),
    Div(Box<Expression>, Box<Expression>),
    Mod(Box<Expression>, Box<Expression>),
    Neg(Box<Expression>),
    Concat(Vec<Expression>),

    // === Comparison ===
    Eq(Box<Expression>, Box<Expression>),
    LT(Box<Expression>, Box<Expression>),
    LE(Box<Expression>, Box<Expression>),
    Between(Box<Expression>, Box<Expression>, Box<Expression>),
    Like(Box<Expression>, Box<Expression>),
    IsMissing(Box<Expression>),
    IsNotMissing(Box<Expression>),
    IsNull(Box<Expression>),
    IsNotNull(Box<Expression>),
    IsValued(Box<Expression>),
    IsNotValued(Box<Expression>),

    // === Logical ===
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),

    // === Collections ===
    In(InList),
    Within(Box<Expression>, Box<Expression>),
    Exists(Box<Expression>),
    Any(Box<CollPred>),
    Every(Box<CollPred>),
    AnyEvery(Box<CollPred>),
    Array(Box<CollMap>),
    First(Box<CollMap>),
    Object(Box<ObjectMap>),

    // === Conditional ===
    SearchedCase {
        whens: Vec<WhenTerm>,
        else_term: Option<Box<Expression>>,
    },
    SimpleCase {
        search: Box<Expression>,
        whens: Vec<WhenTerm>,
        else_term: Option<Box<Expression>>,
    },

    // === Construction ===
    ArrayConstruct(Vec<Expression>),
    /// Fields sorted by name
    ObjectConstruct(Vec<(String, Expression)>),

    // === Navigation ===
    Element(Box<Expression>, Box<Expression>),
    Field(Box<Expression>, Box<Expression>),
    FieldName(String),
    Slice(Box<Expression>, Box<Expression>, Option<Box<Expression>>),

    // === Leaves ===
    Identifier(String),
    SelfRef,
    Constant(Value),
    NamedParameter(String),
    PositionalParameter(usize),

    // === Calls and planner nodes ===
    Function(FunctionCall),
    Subquery(Arc<dyn SubqueryPlan>),
    Cover(Box<CoverExpr>),
    All(Box<AllExpr>),
}

/// An expression tree node
#[derive(Debug, Clone)]
pub struct Expression {
    kind: ExprKind,
    flags: Flags,
    value: OnceCell<Option<Value>>,
    span: Option<Span>,
}

impl Expression {
    // ========================================================================
    // Core construction
    // ========================================================================

    /// Wrap a variant, deriving its semantic flags
    pub fn new(kind: ExprKind) -> Self {
        let mut flags = Flags::empty();
        match &kind {
            ExprKind::And(_)
            | ExprKind::Or(_)
            | ExprKind::SearchedCase { .. }
            | ExprKind::SimpleCase { .. }
            | ExprKind::Any(_)
            | ExprKind::Every(_)
            | ExprKind::AnyEvery(_)
            | ExprKind::Array(_)
            | ExprKind::First(_)
            | ExprKind::Object(_) => flags.insert(Flags::CONDITIONAL),
            ExprKind::Function(call) => {
                flags.set(Flags::CONDITIONAL, call.target.is_conditional());
                flags.set(Flags::VOLATILE, call.target.is_volatile());
            }
            _ => {}
        }
        Self {
            kind,
            flags,
            value: OnceCell::new(),
            span: None,
        }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// Mutable access to the variant; callers must `reset_value` afterwards
    pub fn kind_mut(&mut self) -> &mut ExprKind {
        self.value = OnceCell::new();
        &mut self.kind
    }

    pub fn into_kind(self) -> ExprKind {
        self.kind
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: Flags, on: bool) {
        self.flags.set(flag, on);
    }

    pub fn with_flag(mut self, flag: Flags) -> Self {
        self.flags.insert(flag);
        self
    }

    /// Source range, when parsed from text
    pub fn span(&self) -> Option<Span> {
        self.span
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Deep copy; flags and span are kept, IN nodes get fresh identities
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub(crate) fn placeholder() -> Self {
        Self::new(ExprKind::Constant(Value::Missing))
    }

    // ========================================================================
    // Leaf constructors
    // ========================================================================

    /// Literal value
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::new(ExprKind::Constant(value.into()))
    }

    /// The MISSING literal
    pub fn missing() -> Self {
        Self::constant(Value::Missing)
    }

    /// The NULL literal
    pub fn null() -> Self {
        Self::constant(Value::Null)
    }

    /// `TRUE` or `FALSE`
    pub fn boolean(b: bool) -> Self {
        Self::constant(Value::Boolean(b))
    }

    /// Bare name: a keyspace alias, LET name or binding variable
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Identifier(name.into()))
    }

    /// Identifier matched without regard to case (`` `x`i ``)
    pub fn identifier_ci(name: impl Into<String>) -> Self {
        Self::identifier(name).with_flag(Flags::CASE_INSENSITIVE)
    }

    /// `SELF`, the whole current item
    pub fn self_ref() -> Self {
        Self::new(ExprKind::SelfRef)
    }

    /// `$name`, bound by the execution context
    pub fn named_parameter(name: impl Into<String>) -> Self {
        Self::new(ExprKind::NamedParameter(name.into()))
    }

    /// `$1`, `$2`, ... (1-based)
    pub fn positional_parameter(position: usize) -> Self {
        Self::new(ExprKind::PositionalParameter(position))
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    /// `a + b + ...`
    pub fn add(operands: Vec<Expression>) -> Self {
        Self::new(ExprKind::Add(operands))
    }

    /// `a - b`
    pub fn sub(first: Expression, second: Expression) -> Self {
        Self::new(ExprKind::Sub(Box::new(first), Box::new(second)))
    }

    /// `a * b * ...`
    pub fn mult(operands: Vec<Expression>) -> Self {
        Self::new(ExprKind::Mult(operands))
    }

    /// `a / b`; division by zero yields NULL
    pub fn div(first: Expression, second: Expression) -> Self {
        Self::new(ExprKind::Div(Box::new(first), Box::new(second)))
    }

    /// `a % b`
    pub fn modulo(first: Expression, second: Expression) -> Self {
        Self::new(ExprKind::Mod(Box::new(first), Box::new(second)))
    }

    /// Unary `-a`
    pub fn neg(operand: Expression) -> Self {
        Self::new(ExprKind::Neg(Box::new(operand)))
    }

    /// `a || b || ...` over strings
    pub fn concat(operands: Vec<Expression>) -> Self {
        Self::new(ExprKind::Concat(operands))
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    /// `a = b`
    pub fn equal(first: Expression, second: Expression) -> Self {
        Self::new(ExprKind::Eq(Box::new(first), Box::new(second)))
    }

    /// `a != b`, built as `NOT (a = b)`
    pub fn not_equal(first: Expression, second: Expression) -> Self {
        Self::not(Self::equal(first, second)).with_flag(Flags::NOT_EQUAL)
    }

    /// `a < b`
    pub fn less_than(first: Expression, second: Expression) -> Self {
        Self::new(ExprKind::LT(Box::new(first), Box::new(second)))
    }

    /// `a <= b`
    pub fn less_or_equal(first: Expression, second: Expression) -> Self {
        Self::new(ExprKind::LE(Box::new(first), Box::new(second)))
    }

    /// `a > b`, built as `b < a`
    pub fn greater_than(first: Expression, second: Expression) -> Self {
        Self::less_than(second, first)
    }

    /// `a >= b`, built as `b <= a`
    pub fn greater_or_equal(first: Expression, second: Expression) -> Self {
        Self::less_or_equal(second, first)
    }

    /// `item BETWEEN low AND high`, inclusive on both ends
    pub fn between(item: Expression, low: Expression, high: Expression) -> Self {
        Self::new(ExprKind::Between(Box::new(item), Box::new(low), Box::new(high)))
    }

    /// `a LIKE pattern` with `%` and `_` wildcards
    pub fn like(first: Expression, pattern: Expression) -> Self {
        Self::new(ExprKind::Like(Box::new(first), Box::new(pattern)))
    }

    /// `a IS MISSING`
    pub fn is_missing(operand: Expression) -> Self {
        Self::new(ExprKind::IsMissing(Box::new(operand)))
    }

    /// `a IS NOT MISSING`
    pub fn is_not_missing(operand: Expression) -> Self {
        Self::new(ExprKind::IsNotMissing(Box::new(operand)))
    }

    /// `a IS NULL`
    pub fn is_null(operand: Expression) -> Self {
        Self::new(ExprKind::IsNull(Box::new(operand)))
    }

    /// `a IS NOT NULL`
    pub fn is_not_null(operand: Expression) -> Self {
        Self::new(ExprKind::IsNotNull(Box::new(operand)))
    }

    /// `a IS VALUED`: neither NULL nor MISSING
    pub fn is_valued(operand: Expression) -> Self {
        Self::new(ExprKind::IsValued(Box::new(operand)))
    }

    /// `a IS NOT VALUED`
    pub fn is_not_valued(operand: Expression) -> Self {
        Self::new(ExprKind::IsNotValued(Box::new(operand)))
    }

    // ========================================================================
    // Logical
    // ========================================================================

    /// `a AND b AND ...`
    pub fn and(operands: Vec<Expression>) -> Self {
        Self::new(ExprKind::And(operands))
    }

    /// `a OR b OR ...`
    pub fn or(operands: Vec<Expression>) -> Self {
        Self::new(ExprKind::Or(operands))
    }

    /// `NOT a`
    pub fn not(operand: Expression) -> Self {
        Self::new(ExprKind::Not(Box::new(operand)))
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// `a IN b`; each node gets a fresh identity for per-context hashing
    pub fn in_list(first: Expression, second: Expression) -> Self {
        Self::new(ExprKind::In(InList {
            id: NodeId::next(),
            first: Box::new(first),
            second: Box::new(second),
        }))
    }

    /// `a WITHIN b`
    pub fn within(first: Expression, second: Expression) -> Self {
        Self::new(ExprKind::Within(Box::new(first), Box::new(second)))
    }

    /// `EXISTS a`: TRUE for a non-empty array
    pub fn exists(operand: Expression) -> Self {
        Self::new(ExprKind::Exists(Box::new(operand)))
    }

    /// `ANY bindings SATISFIES pred END`
    pub fn any(bindings: Bindings, satisfies: Expression) -> Self {
        Self::new(ExprKind::Any(Box::new(CollPred {
            bindings,
            satisfies,
        })))
    }

    /// `EVERY bindings SATISFIES pred END`
    pub fn every(bindings: Bindings, satisfies: Expression) -> Self {
        Self::new(ExprKind::Every(Box::new(CollPred {
            bindings,
            satisfies,
        })))
    }

    /// `ANY AND EVERY bindings SATISFIES pred END`
    pub fn any_every(bindings: Bindings, satisfies: Expression) -> Self {
        Self::new(ExprKind::AnyEvery(Box::new(CollPred {
            bindings,
            satisfies,
        })))
    }

    /// `ARRAY mapping FOR bindings [WHEN cond] END`
    pub fn array(mapping: Expression, bindings: Bindings, when: Option<Expression>) -> Self {
        Self::new(ExprKind::Array(Box::new(CollMap {
            mapping,
            bindings,
            when,
        })))
    }

    /// `FIRST mapping FOR bindings [WHEN cond] END`
    pub fn first(mapping: Expression, bindings: Bindings, when: Option<Expression>) -> Self {
        Self::new(ExprKind::First(Box::new(CollMap {
            mapping,
            bindings,
            when,
        })))
    }

    /// `OBJECT name : value FOR bindings [WHEN cond] END`
    pub fn object(
        name: Expression,
        value: Expression,
        bindings: Bindings,
        when: Option<Expression>,
    ) -> Self {
        Self::new(ExprKind::Object(Box::new(ObjectMap {
            name,
            value,
            bindings,
            when,
        })))
    }

    // ========================================================================
    // Conditional and construction
    // ========================================================================

    /// `CASE WHEN c THEN r ... [ELSE e] END`
    pub fn searched_case(whens: Vec<WhenTerm>, else_term: Option<Expression>) -> Self {
        Self::new(ExprKind::SearchedCase {
            whens,
            else_term: else_term.map(Box::new),
        })
    }

    /// `CASE search WHEN v THEN r ... [ELSE e] END`
    pub fn simple_case(search: Expression, whens: Vec<WhenTerm>, else_term: Option<Expression>) -> Self {
        Self::new(ExprKind::SimpleCase {
            search: Box::new(search),
            whens,
            else_term: else_term.map(Box::new),
        })
    }

    /// `[a, b, ...]`
    pub fn array_construct(operands: Vec<Expression>) -> Self {
        Self::new(ExprKind::ArrayConstruct(operands))
    }

    /// Object constructor; fields are kept sorted by name, later duplicates win
    pub fn object_construct(entries: Vec<(String, Expression)>) -> Self {
        let mut sorted: Vec<(String, Expression)> = Vec::with_capacity(entries.len());
        for (name, value) in entries {
            match sorted.binary_search_by(|(n, _)| n.as_str().cmp(name.as_str())) {
                Ok(pos) => sorted[pos].1 = value,
                Err(pos) => sorted.insert(pos, (name, value)),
            }
        }
        Self::new(ExprKind::ObjectConstruct(sorted))
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// `a.b`
    pub fn field(first: Expression, name: impl Into<String>) -> Self {
        Self::new(ExprKind::Field(
            Box::new(first),
            Box::new(Self::field_name(name)),
        ))
    }

    /// `a.b` matching the field name without regard to case
    pub fn field_ci(first: Expression, name: impl Into<String>) -> Self {
        Self::new(ExprKind::Field(
            Box::new(first),
            Box::new(Self::field_name(name).with_flag(Flags::CASE_INSENSITIVE)),
        ))
    }

    /// `a.[expr]`, the field name computed at run time
    pub fn field_expr(first: Expression, name: Expression) -> Self {
        Self::new(ExprKind::Field(Box::new(first), Box::new(name)))
    }

    /// Literal field name on the right of `.`
    pub fn field_name(name: impl Into<String>) -> Self {
        Self::new(ExprKind::FieldName(name.into()))
    }

    /// Build `a.b.c` from a dotted path
    pub fn path(root: impl Into<String>, fields: &[&str]) -> Self {
        fields
            .iter()
            .fold(Self::identifier(root), |acc, name| Self::field(acc, *name))
    }

    /// `a[i]`: arrays by position, objects by computed field name
    pub fn element(first: Expression, index: Expression) -> Self {
        Self::new(ExprKind::Element(Box::new(first), Box::new(index)))
    }

    /// `a[start:end]`, open-ended when `end` is omitted
    pub fn slice(first: Expression, start: Expression, end: Option<Expression>) -> Self {
        Self::new(ExprKind::Slice(
            Box::new(first),
            Box::new(start),
            end.map(Box::new),
        ))
    }

    // ========================================================================
    // Calls and planner nodes
    // ========================================================================

    /// Call a builtin function by name
    pub fn function(name: &str, operands: Vec<Expression>) -> EvalResult<Self> {
        let builtin =
            functions::lookup(name).ok_or_else(|| EvalError::undefined_function(name))?;
        builtin.check_arity(operands.len())?;
        Ok(Self::new(ExprKind::Function(FunctionCall {
            name: builtin.name.to_string(),
            operands,
            target: FunctionTarget::Builtin(builtin),
        })))
    }

    /// Call a user-defined function, resolved through the context at run time
    pub fn user_function(name: impl Into<String>, operands: Vec<Expression>) -> Self {
        let name = name.into();
        Self::new(ExprKind::Function(FunctionCall {
            target: FunctionTarget::User(name.to_lowercase()),
            name,
            operands,
        }))
    }

    /// Opaque subquery node; only built through the API
    pub fn subquery(plan: Arc<dyn SubqueryPlan>) -> Self {
        Self::new(ExprKind::Subquery(plan))
    }

    /// Mark `covered` as available from an index
    pub fn cover(covered: Expression) -> Self {
        let text = covered.to_string();
        Self::new(ExprKind::Cover(Box::new(CoverExpr { covered, text })))
    }

    /// Array index key: `ALL array` or `DISTINCT array`
    pub fn all(array: Expression, distinct: bool) -> Self {
        Self::new(ExprKind::All(Box::new(AllExpr { array, distinct })))
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Direct children in a stable order
    pub fn children(&self) -> Children<'_> {
        let mut out = Children::new();
        match &self.kind {
            ExprKind::Add(ops)
            | ExprKind::Mult(ops)
            | ExprKind::Concat(ops)
            | ExprKind::And(ops)
            | ExprKind::Or(ops)
            | ExprKind::ArrayConstruct(ops) => out.extend(ops.iter()),
            ExprKind::Sub(a, b)
            | ExprKind::Div(a, b)
            | ExprKind::Mod(a, b)
            | ExprKind::Eq(a, b)
            | ExprKind::LT(a, b)
            | ExprKind::LE(a, b)
            | ExprKind::Like(a, b)
            | ExprKind::Within(a, b)
            | ExprKind::Element(a, b)
            | ExprKind::Field(a, b) => {
                out.push(a);
                out.push(b);
            }
            ExprKind::In(list) => {
                out.push(&list.first);
                out.push(&list.second);
            }
            ExprKind::Between(a, b, c) => {
                out.push(a);
                out.push(b);
                out.push(c);
            }
            ExprKind::Neg(a)
            | ExprKind::Not(a)
            | ExprKind::IsMissing(a)
            | ExprKind::IsNotMissing(a)
            | ExprKind::IsNull(a)
            | ExprKind::IsNotNull(a)
            | ExprKind::IsValued(a)
            | ExprKind::IsNotValued(a)
            | ExprKind::Exists(a) => out.push(a),
            ExprKind::Any(pred) | ExprKind::Every(pred) | ExprKind::AnyEvery(pred) => {
                out.extend(pred.bindings.iter().map(|b| &b.expr));
                out.push(&pred.satisfies);
            }
            ExprKind::Array(map) | ExprKind::First(map) => {
                out.extend(map.bindings.iter().map(|b| &b.expr));
                out.push(&map.mapping);
                out.extend(map.when.iter());
            }
            ExprKind::Object(map) => {
                out.extend(map.bindings.iter().map(|b| &b.expr));
                out.push(&map.name);
                out.push(&map.value);
                out.extend(map.when.iter());
            }
            ExprKind::SearchedCase { whens, else_term } => {
                for term in whens {
                    out.push(&term.when);
                    out.push(&term.then);
                }
                out.extend(else_term.iter().map(|e| &**e));
            }
            ExprKind::SimpleCase {
                search,
                whens,
                else_term,
            } => {
                out.push(search);
                for term in whens {
                    out.push(&term.when);
                    out.push(&term.then);
                }
                out.extend(else_term.iter().map(|e| &**e));
            }
            ExprKind::ObjectConstruct(entries) => out.extend(entries.iter().map(|(_, v)| v)),
            ExprKind::Slice(a, b, c) => {
                out.push(a);
                out.push(b);
                out.extend(c.iter().map(|e| &**e));
            }
            ExprKind::Function(call) => out.extend(call.operands.iter()),
            ExprKind::All(all) => out.push(&all.array),
            ExprKind::FieldName(_)
            | ExprKind::Identifier(_)
            | ExprKind::SelfRef
            | ExprKind::Constant(_)
            | ExprKind::NamedParameter(_)
            | ExprKind::PositionalParameter(_)
            | ExprKind::Subquery(_)
            | ExprKind::Cover(_) => {}
        }
        out
    }

    /// Direct children, mutably, in the same order as [`Self::children`]
    pub fn children_mut(&mut self) -> ChildrenMut<'_> {
        let mut out = ChildrenMut::new();
        match &mut self.kind {
            ExprKind::Add(ops)
            | ExprKind::Mult(ops)
            | ExprKind::Concat(ops)
            | ExprKind::And(ops)
            | ExprKind::Or(ops)
            | ExprKind::ArrayConstruct(ops) => out.extend(ops.iter_mut()),
            ExprKind::Sub(a, b)
            | ExprKind::Div(a, b)
            | ExprKind::Mod(a, b)
            | ExprKind::Eq(a, b)
            | ExprKind::LT(a, b)
            | ExprKind::LE(a, b)
            | ExprKind::Like(a, b)
            | ExprKind::Within(a, b)
            | ExprKind::Element(a, b)
            | ExprKind::Field(a, b) => {
                out.push(&mut **a);
                out.push(&mut **b);
            }
            ExprKind::In(list) => {
                out.push(&mut *list.first);
                out.push(&mut *list.second);
            }
            ExprKind::Between(a, b, c) => {
                out.push(&mut **a);
                out.push(&mut **b);
                out.push(&mut **c);
            }
            ExprKind::Neg(a)
            | ExprKind::Not(a)
            | ExprKind::IsMissing(a)
            | ExprKind::IsNotMissing(a)
            | ExprKind::IsNull(a)
            | ExprKind::IsNotNull(a)
            | ExprKind::IsValued(a)
            | ExprKind::IsNotValued(a)
            | ExprKind::Exists(a) => out.push(&mut **a),
            ExprKind::Any(pred) | ExprKind::Every(pred) | ExprKind::AnyEvery(pred) => {
                let CollPred {
                    bindings,
                    satisfies,
                } = &mut **pred;
                out.extend(bindings.iter_mut().map(|b| &mut b.expr));
                out.push(satisfies);
            }
            ExprKind::Array(map) | ExprKind::First(map) => {
                let CollMap {
                    mapping,
                    bindings,
                    when,
                } = &mut **map;
                out.extend(bindings.iter_mut().map(|b| &mut b.expr));
                out.push(mapping);
                out.extend(when.iter_mut());
            }
            ExprKind::Object(map) => {
                let ObjectMap {
                    name,
                    value,
                    bindings,
                    when,
                } = &mut **map;
                out.extend(bindings.iter_mut().map(|b| &mut b.expr));
                out.push(name);
                out.push(value);
                out.extend(when.iter_mut());
            }
            ExprKind::SearchedCase { whens, else_term } => {
                for term in whens.iter_mut() {
                    out.push(&mut term.when);
                    out.push(&mut term.then);
                }
                out.extend(else_term.iter_mut().map(|e| &mut **e));
            }
            ExprKind::SimpleCase {
                search,
                whens,
                else_term,
            } => {
                out.push(&mut **search);
                for term in whens.iter_mut() {
                    out.push(&mut term.when);
                    out.push(&mut term.then);
                }
                out.extend(else_term.iter_mut().map(|e| &mut **e));
            }
            ExprKind::ObjectConstruct(entries) => out.extend(entries.iter_mut().map(|(_, v)| v)),
            ExprKind::Slice(a, b, c) => {
                out.push(&mut **a);
                out.push(&mut **b);
                out.extend(c.iter_mut().map(|e| &mut **e));
            }
            ExprKind::Function(call) => out.extend(call.operands.iter_mut()),
            ExprKind::All(all) => out.push(&mut all.array),
            ExprKind::FieldName(_)
            | ExprKind::Identifier(_)
            | ExprKind::SelfRef
            | ExprKind::Constant(_)
            | ExprKind::NamedParameter(_)
            | ExprKind::PositionalParameter(_)
            | ExprKind::Subquery(_)
            | ExprKind::Cover(_) => {}
        }
        out
    }

    /// Replace every child with `mapper(child)`, in place
    ///
    /// The node's memoized value is cleared. On error the remaining children
    /// are left untouched and the failed slot holds a MISSING constant.
    pub fn map_children(
        &mut self,
        mapper: &mut dyn FnMut(Expression) -> EvalResult<Expression>,
    ) -> EvalResult<()> {
        self.value = OnceCell::new();
        for slot in self.children_mut() {
            let child = std::mem::replace(slot, Self::placeholder());
            *slot = mapper(child)?;
        }
        Ok(())
    }

    /// Forget memoized constant values here and below
    pub fn reset_value(&mut self) {
        self.value = OnceCell::new();
        if let ExprKind::Cover(cover) = &mut self.kind {
            cover.covered.reset_value();
        }
        for child in self.children_mut() {
            child.reset_value();
        }
    }

    // ========================================================================
    // Static properties
    // ========================================================================

    pub fn is_conditional(&self) -> bool {
        self.flags.contains(Flags::CONDITIONAL)
    }

    /// Evaluation may differ between calls with the same input
    pub fn is_volatile(&self) -> bool {
        self.flags.contains(Flags::VOLATILE)
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.flags.contains(Flags::CASE_INSENSITIVE)
    }

    pub fn is_binding_variable(&self) -> bool {
        self.flags.contains(Flags::BINDING_VARIABLE)
    }

    /// Compile-time constant value, memoized
    ///
    /// `None` when the result depends on input, parameters, the clock or
    /// randomness. Probing runs a real evaluation against an empty scope; a
    /// failure or panic during the probe only means "not constant".
    pub fn value(&self) -> Option<&Value> {
        self.value.get_or_init(|| self.compute_value()).as_ref()
    }

    /// The memoized constant if it has already been computed
    pub(crate) fn cached_value(&self) -> Option<&Option<Value>> {
        self.value.get()
    }

    fn compute_value(&self) -> Option<Value> {
        match &self.kind {
            ExprKind::Constant(v) => return Some(v.clone()),
            ExprKind::FieldName(name) => return Some(Value::string(name.clone())),
            ExprKind::Identifier(_)
            | ExprKind::SelfRef
            | ExprKind::NamedParameter(_)
            | ExprKind::PositionalParameter(_)
            | ExprKind::Subquery(_)
            | ExprKind::Cover(_) => return None,
            _ => {}
        }

        if self.is_volatile() {
            return None;
        }

        let prop_missing = self.propagates_missing();
        let prop_null = self.propagates_null();
        let mut unknown = false;
        let mut null = false;
        for child in self.children() {
            match child.value() {
                None => unknown = true,
                Some(v) if prop_missing && v.is_missing() => return Some(Value::Missing),
                Some(v) if prop_null && v.is_null() => null = true,
                Some(_) => {}
            }
        }
        if null {
            return Some(Value::Null);
        }
        if unknown {
            return None;
        }

        let ctx = probe_context();
        match catch_unwind(AssertUnwindSafe(|| self.evaluate(&Scope::empty(), ctx))) {
            Ok(Ok(v)) => Some(v),
            Ok(Err(err)) => {
                debug!("constant probe of {self} failed: {err}");
                None
            }
            Err(_) => {
                debug!("constant probe of {self} panicked; treating as non-constant");
                None
            }
        }
    }

    /// Result is MISSING whenever an operand is MISSING
    ///
    /// False negatives are allowed, false positives are not.
    pub fn propagates_missing(&self) -> bool {
        if self
            .flags
            .intersects(Flags::CONDITIONAL | Flags::PROPAGATE_MISSING_INHIBITED)
        {
            return false;
        }
        match &self.kind {
            ExprKind::IsMissing(_)
            | ExprKind::IsNotMissing(_)
            | ExprKind::IsNull(_)
            | ExprKind::IsNotNull(_)
            | ExprKind::IsValued(_)
            | ExprKind::IsNotValued(_)
            | ExprKind::ArrayConstruct(_)
            | ExprKind::ObjectConstruct(_)
            | ExprKind::Cover(_) => false,
            ExprKind::Function(call) if !call.target.propagates_missing() => false,
            _ => self.children().iter().all(|c| c.propagates_missing()),
        }
    }

    /// Result is NULL whenever an operand is NULL
    pub fn propagates_null(&self) -> bool {
        if self
            .flags
            .intersects(Flags::CONDITIONAL | Flags::PROPAGATE_NULL_INHIBITED)
        {
            return false;
        }
        match &self.kind {
            ExprKind::IsMissing(_)
            | ExprKind::IsNotMissing(_)
            | ExprKind::IsNull(_)
            | ExprKind::IsNotNull(_)
            | ExprKind::IsValued(_)
            | ExprKind::IsNotValued(_)
            | ExprKind::ArrayConstruct(_)
            | ExprKind::ObjectConstruct(_)
            | ExprKind::Field(..)
            | ExprKind::Element(..)
            | ExprKind::Cover(_) => false,
            ExprKind::Function(call) if !call.target.propagates_null() => false,
            _ => self.children().iter().all(|c| c.propagates_null()),
        }
    }

    /// Best static guess of the result type
    pub fn value_type(&self) -> ValueType {
        if let Some(v) = self.value() {
            return v.type_of();
        }
        match &self.kind {
            ExprKind::Add(_)
            | ExprKind::Sub(..)
            | ExprKind::Mult(_)
            | ExprKind::Div(..)
            | ExprKind::Mod(..)
            | ExprKind::Neg(_) => ValueType::Number,
            ExprKind::Concat(_) | ExprKind::FieldName(_) => ValueType::String,
            ExprKind::Eq(..)
            | ExprKind::LT(..)
            | ExprKind::LE(..)
            | ExprKind::Between(..)
            | ExprKind::Like(..)
            | ExprKind::IsMissing(_)
            | ExprKind::IsNotMissing(_)
            | ExprKind::IsNull(_)
            | ExprKind::IsNotNull(_)
            | ExprKind::IsValued(_)
            | ExprKind::IsNotValued(_)
            | ExprKind::And(_)
            | ExprKind::Or(_)
            | ExprKind::Not(_)
            | ExprKind::In(_)
            | ExprKind::Within(..)
            | ExprKind::Exists(_)
            | ExprKind::Any(_)
            | ExprKind::Every(_)
            | ExprKind::AnyEvery(_) => ValueType::Boolean,
            ExprKind::Array(_) | ExprKind::ArrayConstruct(_) | ExprKind::Slice(..) => ValueType::Array,
            ExprKind::Object(_) | ExprKind::ObjectConstruct(_) => ValueType::Object,
            ExprKind::First(map) => map.mapping.value_type(),
            ExprKind::SearchedCase { whens, else_term } => {
                common_type(whens.iter().map(|w| &w.then), else_term.as_deref())
            }
            ExprKind::SimpleCase {
                whens, else_term, ..
            } => common_type(whens.iter().map(|w| &w.then), else_term.as_deref()),
            ExprKind::Function(call) => match call.target.result_type() {
                ResultType::Fixed(t) => t,
                ResultType::FirstArg => call
                    .operands
                    .first()
                    .map_or(ValueType::Json, |e| e.value_type()),
                ResultType::CommonArgs => common_type(call.operands.iter(), None),
                ResultType::Json => ValueType::Json,
            },
            ExprKind::Cover(cover) => cover.covered.value_type(),
            ExprKind::All(all) => all.array.value_type(),
            ExprKind::Constant(v) => v.type_of(),
            ExprKind::Element(..)
            | ExprKind::Field(..)
            | ExprKind::Identifier(_)
            | ExprKind::SelfRef
            | ExprKind::NamedParameter(_)
            | ExprKind::PositionalParameter(_)
            | ExprKind::Subquery(_) => ValueType::Json,
        }
    }

    /// Terminal identifier of a path: `a.b.c` gives `c`, `x` gives `x`
    pub fn alias(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            ExprKind::Field(_, second) => match &second.kind {
                ExprKind::FieldName(name) => Some(name),
                _ => None,
            },
            ExprKind::Cover(cover) => cover.covered.alias(),
            _ => None,
        }
    }

    /// Built only from constants and parameters
    pub fn is_static(&self) -> bool {
        match &self.kind {
            ExprKind::Constant(_)
            | ExprKind::FieldName(_)
            | ExprKind::NamedParameter(_)
            | ExprKind::PositionalParameter(_) => true,
            ExprKind::Identifier(_)
            | ExprKind::SelfRef
            | ExprKind::Subquery(_)
            | ExprKind::Cover(_) => false,
            _ => !self.is_volatile() && self.children().iter().all(|c| c.is_static()),
        }
    }

    /// Uncorrelated subquery
    pub fn is_uncorrelated_subquery(&self) -> bool {
        matches!(&self.kind, ExprKind::Subquery(plan) if !plan.is_correlated())
    }

    /// Privileges needed to evaluate the tree: the union over children
    pub fn privileges(&self) -> Privileges {
        if let ExprKind::Subquery(plan) = &self.kind {
            return plan.privileges();
        }

        let children = self.children();
        match children.as_slice() {
            [] => Privileges::new(),
            [only] => only.privileges(),
            many => {
                let mut union = Privileges::new();
                for child in many {
                    union.add_all(&child.privileges());
                }
                union
            }
        }
    }

    /// Whether the expression can still be computed after grouping by `keys`
    pub fn survives_grouping(&self, keys: &[Expression]) -> bool {
        self.non_grouped(keys, &mut Vec::new()).is_none()
    }

    /// First subexpression that does not survive grouping by `keys`
    pub fn non_grouped<'a>(&'a self, keys: &[Expression], allowed: &mut Vec<String>) -> Option<&'a Expression> {
        if keys.iter().any(|k| self.equivalent_to(k)) {
            return None;
        }

        match &self.kind {
            ExprKind::Identifier(name) => {
                if self.is_binding_variable() || allowed.iter().any(|a| a == name) {
                    None
                } else {
                    Some(self)
                }
            }
            ExprKind::SelfRef => Some(self),
            ExprKind::Subquery(_) | ExprKind::Cover(_) => None,
            ExprKind::Any(pred) | ExprKind::Every(pred) | ExprKind::AnyEvery(pred) => {
                with_bound(&pred.bindings, keys, allowed, [Some(&pred.satisfies), None, None])
            }
            ExprKind::Array(map) | ExprKind::First(map) => with_bound(
                &map.bindings,
                keys,
                allowed,
                [Some(&map.mapping), map.when.as_ref(), None],
            ),
            ExprKind::Object(map) => with_bound(
                &map.bindings,
                keys,
                allowed,
                [Some(&map.name), Some(&map.value), map.when.as_ref()],
            ),
            _ => self
                .children()
                .into_iter()
                .find_map(|c| c.non_grouped(keys, allowed)),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Bindings of a quantifier or comprehension
    pub fn bindings(&self) -> Option<&Bindings> {
        match &self.kind {
            ExprKind::Any(p) | ExprKind::Every(p) | ExprKind::AnyEvery(p) => Some(&p.bindings),
            ExprKind::Array(m) | ExprKind::First(m) => Some(&m.bindings),
            ExprKind::Object(m) => Some(&m.bindings),
            _ => None,
        }
    }

    pub fn bindings_mut(&mut self) -> Option<&mut Bindings> {
        match &mut self.kind {
            ExprKind::Any(p) | ExprKind::Every(p) | ExprKind::AnyEvery(p) => Some(&mut p.bindings),
            ExprKind::Array(m) | ExprKind::First(m) => Some(&mut m.bindings),
            ExprKind::Object(m) => Some(&mut m.bindings),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// The array index key form, if this is one
    pub fn as_all(&self) -> Option<&AllExpr> {
        match &self.kind {
            ExprKind::All(all) => Some(all),
            _ => None,
        }
    }

    /// Array comprehension behind an array index key
    pub fn array_key_map(&self) -> Option<&CollMap> {
        match &self.as_all()?.array.kind {
            ExprKind::Array(map) => Some(map),
            _ => None,
        }
    }

    /// Whether two nodes are the same variant
    pub fn same_kind(&self, other: &Expression) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
    }
}

fn with_bound<'a>(
    bindings: &'a Bindings,
    keys: &[Expression],
    allowed: &mut Vec<String>,
    bodies: [Option<&'a Expression>; 3],
) -> Option<&'a Expression> {
    if let Some(bad) = bindings.iter().find_map(|b| b.expr.non_grouped(keys, allowed)) {
        return Some(bad);
    }
    let mark = allowed.len();
    for b in bindings.iter() {
        allowed.push(b.variable.clone());
        if let Some(name) = &b.name_variable {
            allowed.push(name.clone());
        }
    }
    let rv = bodies
        .into_iter()
        .flatten()
        .find_map(|body| body.non_grouped(keys, allowed));
    allowed.truncate(mark);
    rv
}

fn common_type<'a>(
    branches: impl Iterator<Item = &'a Expression>,
    else_term: Option<&Expression>,
) -> ValueType {
    let mut common: Option<ValueType> = None;
    for t in branches.map(|e| e.value_type()).chain(else_term.map(|e| e.value_type())) {
        match common {
            None => common = Some(t),
            Some(c) if c == t => {}
            Some(_) => return ValueType::Json,
        }
    }
    common.unwrap_or(ValueType::Null)
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Self::constant(value)
    }
}

/// Single non-descending binding `variable IN expr`
impl From<Binding> for Bindings {
    fn from(binding: Binding) -> Self {
        Bindings::from_iter([binding])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn int(i: i64) -> Expression {
        Expression::constant(i)
    }

    #[test]
    fn test_constant_folding_probe() {
        let e = Expression::add(vec![int(1), Expression::mult(vec![int(2), int(3)])]);
        assert_eq!(e.value(), Some(&Value::int(7)));

        let e = Expression::add(vec![int(1), Expression::identifier("x")]);
        assert_eq!(e.value(), None);
    }

    #[test]
    fn test_missing_child_propagates_statically() {
        let e = Expression::add(vec![Expression::identifier("x"), Expression::missing()]);
        assert_eq!(e.value(), Some(&Value::Missing));

        let e = Expression::add(vec![Expression::identifier("x"), Expression::null()]);
        assert_eq!(e.value(), Some(&Value::Null));
    }

    #[test]
    fn test_conditional_does_not_propagate() {
        let case = Expression::searched_case(
            vec![WhenTerm {
                when: Expression::identifier("c"),
                then: Expression::missing(),
            }],
            Some(int(1)),
        );
        assert!(case.is_conditional());
        assert!(!case.propagates_missing());
        assert_eq!(case.value(), None);
    }

    #[test]
    fn test_volatile_is_never_constant() {
        let e = Expression::function("random", vec![]).unwrap();
        assert!(e.is_volatile());
        assert_eq!(e.value(), None);
    }

    #[test]
    fn test_children_order() {
        let e = Expression::array(
            Expression::identifier("v"),
            Binding::new("v", Expression::identifier("arr")).into(),
            Some(Expression::boolean(true)),
        );
        let names: Vec<String> = e.children().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["`arr`", "`v`", "true"]);
    }

    #[test]
    fn test_map_children_resets_value() {
        let mut e = Expression::add(vec![int(1), int(2)]);
        assert_eq!(e.value(), Some(&Value::int(3)));
        e.map_children(&mut |c| {
            Ok(match c.as_constant() {
                Some(Value::Number(n)) => Expression::constant(Value::Number(n.mul(docql_value::Number::Int(10)))),
                _ => c,
            })
        })
        .unwrap();
        assert_eq!(e.value(), Some(&Value::int(30)));
    }

    #[test]
    fn test_copy_renews_in_identity() {
        let e = Expression::in_list(int(1), Expression::identifier("xs"));
        let copy = e.copy();
        let (ExprKind::In(a), ExprKind::In(b)) = (e.kind(), copy.kind()) else {
            panic!("expected IN");
        };
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_alias_and_static() {
        assert_eq!(Expression::path("d", &["a", "b"]).alias(), Some("b"));
        assert_eq!(Expression::identifier("x").alias(), Some("x"));
        assert_eq!(int(1).alias(), None);

        let list = Expression::array_construct(vec![int(1), Expression::named_parameter("p")]);
        assert!(list.is_static());
        assert!(!Expression::array_construct(vec![Expression::identifier("x")]).is_static());
    }

    #[test]
    fn test_object_construct_sorted() {
        let e = Expression::object_construct(vec![
            ("b".into(), int(2)),
            ("a".into(), int(1)),
            ("b".into(), int(3)),
        ]);
        let ExprKind::ObjectConstruct(entries) = e.kind() else {
            panic!("expected object");
        };
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(entries[1].1.value(), Some(&Value::int(3)));
    }

    #[test]
    fn test_survives_grouping() {
        let key = Expression::path("d", &["a"]);
        let e = Expression::add(vec![key.copy(), int(1)]);
        assert!(e.survives_grouping(std::slice::from_ref(&key)));

        let e = Expression::add(vec![key.copy(), Expression::path("d", &["b"])]);
        assert!(!e.survives_grouping(std::slice::from_ref(&key)));

        let any = Expression::any(
            Binding::new("v", key.copy()).into(),
            Expression::equal(Expression::identifier("v"), int(1)),
        );
        assert!(any.survives_grouping(&[key]));
    }

    #[test]
    fn test_value_type() {
        assert_eq!(Expression::equal(int(1), Expression::identifier("x")).value_type(), ValueType::Boolean);
        let case = Expression::searched_case(
            vec![WhenTerm {
                when: Expression::identifier("c"),
                then: Expression::constant("a"),
            }],
            Some(Expression::constant(1)),
        );
        assert_eq!(case.value_type(), ValueType::Json);
    }
}
