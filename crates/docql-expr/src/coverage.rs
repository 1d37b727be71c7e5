//! Index coverage
//!
//! Decides whether an expression can be computed from the key values of an
//! index alone, without fetching the document from the keyspace.
//!
//! Results are ordered by strength:
//!
//! - `False`: the document itself is needed
//! - `Skip`: nothing here reads the keyspace (constants, other aliases)
//! - `Equiv`: the expression is one of the index keys
//! - `True`: every keyspace reference is answered by an index key
//!
//! Array index keys (`ALL ARRAY m FOR v IN src END`) cover quantifiers over
//! `src` in two phases: the binding expressions first, then the body with
//! the key's mapping standing in for the variable.

use crate::binding::Bindings;
use crate::expression::{ExprKind, Expression};
use crate::flags::Flags;
use crate::transform::rename_bindings;
use docql_value::Value;
use indexmap::IndexMap;
use log::trace;
use std::fmt;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoveredResult {
    False,
    /// Reserved; never returned
    Continue,
    Skip,
    Equiv,
    True,
}

impl CoveredResult {
    /// `Skip`, `Equiv` and `True` all mean the index suffices
    pub fn is_covered(self) -> bool {
        matches!(self, Self::Skip | Self::Equiv | Self::True)
    }
}

impl fmt::Display for CoveredResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::False => "false",
            Self::Continue => "continue",
            Self::Skip => "skip",
            Self::Equiv => "equiv",
            Self::True => "true",
        };
        f.write_str(name)
    }
}

/// Options threaded through one coverage check
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CoveredOptions(u32);

impl CoveredOptions {
    /// Variables of enclosing quantifiers count as covered
    pub const BIND_VAR: CoveredOptions = CoveredOptions(1 << 0);
    /// Checking binding expressions against an array key
    pub const BIND_EXPR: CoveredOptions = CoveredOptions(1 << 1);
    /// Checking a quantifier body against an array key's mapping
    pub const SATISFIES: CoveredOptions = CoveredOptions(1 << 2);
    /// `Skip`/`Equiv` of a path's base propagate to the whole path
    pub const TRICKLE: CoveredOptions = CoveredOptions(1 << 3);
    /// Array index keys may cover quantifiers
    pub const ARRAY_KEY: CoveredOptions = CoveredOptions(1 << 4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: CoveredOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, other: CoveredOptions) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: CoveredOptions) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for CoveredOptions {
    type Output = CoveredOptions;

    fn bitor(self, rhs: CoveredOptions) -> CoveredOptions {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for CoveredOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoveredOptions({:#07b})", self.0)
    }
}

impl Expression {
    /// Coverage of this expression by the index keys `exprs` over
    /// `keyspace`
    pub fn covered_by(&self, keyspace: &str, exprs: &[Expression], options: CoveredOptions) -> CoveredResult {
        let expanded;
        let keys: Vec<&Expression> = if options.contains(CoveredOptions::ARRAY_KEY) {
            expanded = expand_flatten_keys(exprs);
            expanded.iter().collect()
        } else {
            exprs.iter().collect()
        };
        let mut coverage = Coverage {
            keyspace,
            keys,
            scope: Vec::new(),
            options,
        };
        let rv = coverage.check(self);
        trace!("coverage of {self} by {} keys over `{keyspace}`: {rv}", exprs.len());
        rv
    }
}

/// Plain coverage: array keys are only matched by equivalence
pub fn is_covered(expr: &Expression, keyspace: &str, exprs: &[Expression]) -> bool {
    expr.covered_by(keyspace, exprs, CoveredOptions::TRICKLE).is_covered()
}

/// Coverage letting array index keys answer quantifiers
pub fn is_array_covered(expr: &Expression, keyspace: &str, exprs: &[Expression]) -> bool {
    expr.covered_by(keyspace, exprs, CoveredOptions::TRICKLE | CoveredOptions::ARRAY_KEY)
        .is_covered()
}

/// One synthetic array key per `flatten_keys` operand
///
/// `ALL ARRAY FLATTEN_KEYS(v.a, v.b) FOR v IN xs END` becomes
/// `ALL ARRAY v.a FOR v IN xs END` and `ALL ARRAY v.b FOR v IN xs END`.
/// Other keys are copied as they are.
pub fn expand_flatten_keys(exprs: &[Expression]) -> Vec<Expression> {
    let mut out = Vec::with_capacity(exprs.len());
    for key in exprs {
        let (Some(all), Some(map)) = (key.as_all(), key.array_key_map()) else {
            out.push(key.copy());
            continue;
        };
        let ExprKind::Function(call) = map.mapping.kind() else {
            out.push(key.copy());
            continue;
        };
        if !call.name.eq_ignore_ascii_case("flatten_keys") {
            out.push(key.copy());
            continue;
        }
        for operand in &call.operands {
            let array = Expression::array(operand.copy(), map.bindings.clone(), map.when.as_ref().map(Expression::copy));
            out.push(Expression::all(array, all.distinct).with_flag(Flags::DERIVED_FROM_FLATTEN));
        }
    }
    out
}

/// Conjuncts of a partial-index or WHEN condition, keyed by canonical
/// text; each one holds for every indexed entry
pub fn filter_covers(expr: &Expression) -> IndexMap<String, Value> {
    let mut covers = IndexMap::new();
    for term in filter_terms(expr) {
        covers.insert(term.to_string(), Value::TRUE);
    }
    covers
}

fn filter_terms(expr: &Expression) -> Vec<&Expression> {
    let mut out = Vec::new();
    collect_filter_terms(expr, &mut out);
    out
}

fn collect_filter_terms<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match expr.kind() {
        ExprKind::And(ops) => {
            for op in ops {
                collect_filter_terms(op, out);
            }
        }
        ExprKind::Eq(..)
        | ExprKind::LT(..)
        | ExprKind::LE(..)
        | ExprKind::Between(..)
        | ExprKind::Like(..)
        | ExprKind::In(_)
        | ExprKind::Within(..)
        | ExprKind::IsMissing(_)
        | ExprKind::IsNotMissing(_)
        | ExprKind::IsNull(_)
        | ExprKind::IsNotNull(_)
        | ExprKind::IsValued(_)
        | ExprKind::IsNotValued(_)
        | ExprKind::Any(_)
        | ExprKind::Every(_)
        | ExprKind::AnyEvery(_) => out.push(expr),
        ExprKind::Not(inner) if matches!(inner.kind(), ExprKind::Eq(..)) => out.push(expr),
        _ => {}
    }
}

struct Coverage<'a> {
    keyspace: &'a str,
    keys: Vec<&'a Expression>,
    /// Variables in scope and whether their values are covered
    scope: Vec<(String, bool)>,
    options: CoveredOptions,
}

impl<'a> Coverage<'a> {
    fn check(&mut self, expr: &Expression) -> CoveredResult {
        if let ExprKind::Cover(_) = expr.kind() {
            return CoveredResult::True;
        }
        if self.keys.iter().any(|k| expr.equivalent_to(k)) {
            return CoveredResult::Equiv;
        }

        match expr.kind() {
            ExprKind::Constant(_)
            | ExprKind::FieldName(_)
            | ExprKind::NamedParameter(_)
            | ExprKind::PositionalParameter(_) => CoveredResult::Skip,
            ExprKind::Identifier(name) => self.identifier(expr, name),
            ExprKind::SelfRef => CoveredResult::False,
            ExprKind::Subquery(plan) => {
                if plan.is_correlated() {
                    CoveredResult::False
                } else {
                    CoveredResult::Skip
                }
            }
            // An index entry holds one element's mapping, so only
            // quantifiers can be answered from it
            ExprKind::Any(_) | ExprKind::Every(_) | ExprKind::AnyEvery(_)
                if self.options.contains(CoveredOptions::ARRAY_KEY) =>
            {
                match self.by_array_key(expr) {
                    Some(rv) => rv,
                    None => self.scoped(expr),
                }
            }
            ExprKind::Any(_)
            | ExprKind::Every(_)
            | ExprKind::AnyEvery(_)
            | ExprKind::Array(_)
            | ExprKind::First(_)
            | ExprKind::Object(_) => self.scoped(expr),
            ExprKind::Field(..) | ExprKind::Element(..) | ExprKind::Slice(..) => self.path(expr),
            _ => self.children(expr.children()),
        }
    }

    fn identifier(&self, expr: &Expression, name: &str) -> CoveredResult {
        if let Some((_, covered)) = self.scope.iter().rev().find(|(n, _)| n == name) {
            return if *covered {
                CoveredResult::True
            } else {
                CoveredResult::False
            };
        }
        let is_keyspace = if expr.is_case_insensitive() {
            name.eq_ignore_ascii_case(self.keyspace)
        } else {
            name == self.keyspace
        };
        if is_keyspace {
            CoveredResult::False
        } else if expr.is_binding_variable() && self.options.contains(CoveredOptions::BIND_VAR) {
            CoveredResult::True
        } else {
            CoveredResult::Skip
        }
    }

    /// `False` if any child is, `Skip` if all are, else `True`
    fn children<'e>(&mut self, children: impl IntoIterator<Item = &'e Expression>) -> CoveredResult {
        let mut rv = CoveredResult::Skip;
        for child in children {
            match self.check(child) {
                CoveredResult::False => return CoveredResult::False,
                CoveredResult::Equiv | CoveredResult::True => rv = CoveredResult::True,
                CoveredResult::Skip | CoveredResult::Continue => {}
            }
        }
        rv
    }

    /// Navigation: with TRICKLE a covered base answers the whole path
    fn path(&mut self, expr: &Expression) -> CoveredResult {
        let children = expr.children();
        let Some((base, rest)) = children.split_first() else {
            return CoveredResult::Skip;
        };
        let base_rv = self.check(base);
        if base_rv == CoveredResult::False {
            return CoveredResult::False;
        }
        let rest_rv = self.children(rest.iter().copied());
        if rest_rv == CoveredResult::False {
            return CoveredResult::False;
        }
        if self.options.contains(CoveredOptions::TRICKLE) && base_rv == CoveredResult::Equiv {
            return CoveredResult::Equiv;
        }
        match (base_rv, rest_rv) {
            (CoveredResult::Skip, CoveredResult::Skip) => CoveredResult::Skip,
            _ => CoveredResult::True,
        }
    }

    /// Quantifier or comprehension without an array key: binding
    /// expressions in the outer scope, bodies with the variables covered
    fn scoped(&mut self, expr: &Expression) -> CoveredResult {
        let Some(bindings) = expr.bindings() else {
            return self.children(expr.children());
        };
        let children = expr.children();
        let (outer, bodies) = children.split_at(bindings.len().min(children.len()));

        let outer_rv = self.children(outer.iter().copied());
        if outer_rv == CoveredResult::False {
            return CoveredResult::False;
        }

        let mark = self.scope.len();
        self.scope
            .extend(bindings.variable_names().into_iter().map(|n| (n.to_string(), true)));
        let body_rv = self.children(bodies.iter().copied());
        self.scope.truncate(mark);

        match (outer_rv, body_rv) {
            (_, CoveredResult::False) => CoveredResult::False,
            (CoveredResult::Skip, CoveredResult::Skip) => CoveredResult::Skip,
            _ => CoveredResult::True,
        }
    }

    /// Two-phase check against the first array key ranging over the same
    /// collections; `None` when no key applies
    fn by_array_key(&mut self, expr: &Expression) -> Option<CoveredResult> {
        let bindings = expr.bindings()?;
        let candidates: Vec<&'a Expression> = self
            .keys
            .iter()
            .copied()
            .filter(|k| k.array_key_map().is_some_and(|m| binds_subset(bindings, &m.bindings)))
            .collect();

        for key in candidates {
            let Some(map) = key.array_key_map() else {
                continue;
            };
            let Some((renamed, _)) = rename_bindings(expr, &map.bindings) else {
                trace!("binding variables of {expr} conflict with array key {key}");
                return Some(CoveredResult::False);
            };
            let Some(renamed_bindings) = renamed.bindings() else {
                continue;
            };

            // Phase one: the collections themselves
            let mut bind_keys = self.keys.clone();
            bind_keys.extend(map.bindings.iter().map(|b| &b.expr));
            let mut phase = Coverage {
                keyspace: self.keyspace,
                keys: bind_keys,
                scope: self.scope.clone(),
                options: self.options.with(CoveredOptions::BIND_EXPR),
            };
            let bind_rv = phase.children(renamed_bindings.iter().map(|b| &b.expr));
            if bind_rv == CoveredResult::False {
                continue;
            }

            // Phase two: bodies see the key's mapping, not the variables
            let mut body_keys: Vec<&Expression> = vec![&map.mapping];
            if let Some(when) = &map.when {
                body_keys.extend(filter_terms(when));
            }
            body_keys.extend(self.keys.iter().copied().filter(|k| k.as_all().is_none()));
            let mut scope = self.scope.clone();
            scope.extend(
                renamed_bindings
                    .variable_names()
                    .into_iter()
                    .map(|n| (n.to_string(), false)),
            );
            let mut phase = Coverage {
                keyspace: self.keyspace,
                keys: body_keys,
                scope,
                options: self.options.without(CoveredOptions::BIND_EXPR).with(CoveredOptions::SATISFIES),
            };
            let children = renamed.children();
            let bodies = children.get(renamed_bindings.len()..).unwrap_or(&[]);
            let body_rv = phase.children(bodies.iter().copied());
            trace!("array key {key} for {expr}: bindings {bind_rv}, body {body_rv}");
            if body_rv != CoveredResult::False {
                return Some(CoveredResult::True);
            }
        }
        None
    }
}

/// Positional subset test between quantifier bindings and key bindings
fn binds_subset(bindings: &Bindings, key: &Bindings) -> bool {
    bindings.len() == key.len() && bindings.iter().zip(key.iter()).all(|(b, k)| b.subset_of(k))
}
