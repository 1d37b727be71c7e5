//! Identifier substitution: renaming, inlining and replacement

use super::traverser::{Visit, free_identifiers, traverse};
use super::{Mapper, bound_names, map_children_scoped};
use crate::binding::{BindingVarOptions, Bindings, Renaming};
use crate::error::EvalResult;
use crate::expression::{ExprKind, Expression};
use log::trace;
use std::collections::HashMap;

/// Replaces free identifiers with expressions
///
/// Identifiers rebound by a nested quantifier or comprehension are left
/// alone inside its body.
#[derive(Debug, Default)]
pub struct Inliner {
    substitutes: HashMap<String, Expression>,
    shadowed: Vec<String>,
}

impl Inliner {
    pub fn new<'a>(substitutes: impl IntoIterator<Item = (&'a str, &'a Expression)>) -> Self {
        Self {
            substitutes: substitutes
                .into_iter()
                .map(|(name, e)| (name.to_string(), e.copy()))
                .collect(),
            shadowed: Vec::new(),
        }
    }

    fn lookup(&self, expr: &Expression) -> Option<&Expression> {
        let ExprKind::Identifier(name) = expr.kind() else {
            return None;
        };
        if self.shadowed.iter().any(|s| s == name) {
            return None;
        }
        if expr.is_case_insensitive() {
            self.substitutes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        } else {
            self.substitutes.get(name)
        }
    }
}

impl Mapper for Inliner {
    fn substitute(&mut self, expr: &Expression) -> EvalResult<Option<Expression>> {
        Ok(self.lookup(expr).map(|sub| {
            let mut sub = sub.copy();
            if matches!(sub.kind(), ExprKind::Identifier(_)) {
                sub.set_flag(expr.flags(), true);
            }
            sub
        }))
    }

    fn map(&mut self, mut expr: Expression) -> EvalResult<Expression> {
        if let Some(sub) = self.substitute(&expr)? {
            return Ok(sub);
        }
        let bound = bound_names(&expr);
        map_children_scoped(&mut expr, &mut |child, in_body| {
            let mark = self.shadowed.len();
            if in_body {
                self.shadowed.extend(bound.iter().cloned());
            }
            let rv = self.map(child);
            self.shadowed.truncate(mark);
            rv
        })?;
        Ok(expr)
    }
}

/// Renames free identifiers; flags on the renamed nodes are kept
#[derive(Debug)]
pub struct Renamer(Inliner);

impl Renamer {
    pub fn new(mapping: &[(String, String)]) -> Self {
        Self(Inliner {
            substitutes: mapping
                .iter()
                .map(|(from, to)| (from.clone(), Expression::identifier(to.as_str())))
                .collect(),
            shadowed: Vec::new(),
        })
    }
}

impl Mapper for Renamer {
    fn substitute(&mut self, expr: &Expression) -> EvalResult<Option<Expression>> {
        self.0.substitute(expr)
    }

    fn map(&mut self, expr: Expression) -> EvalResult<Expression> {
        self.0.map(expr)
    }
}

/// Replaces every subexpression equivalent to a `from` with its `to`
#[derive(Debug)]
pub struct Replacer<'a> {
    pairs: &'a [(Expression, Expression)],
}

impl<'a> Replacer<'a> {
    pub fn new(pairs: &'a [(Expression, Expression)]) -> Self {
        Self { pairs }
    }
}

impl Mapper for Replacer<'_> {
    fn substitute(&mut self, expr: &Expression) -> EvalResult<Option<Expression>> {
        Ok(self
            .pairs
            .iter()
            .find(|(from, _)| expr.equivalent_to(from))
            .map(|(_, to)| to.copy()))
    }
}

/// Apply a binding renaming to free identifiers of `expr`
pub fn rename_variables(expr: Expression, renaming: &Renaming) -> EvalResult<Expression> {
    if renaming.mapping.is_empty() {
        return Ok(expr);
    }
    let mut rv = Renamer::new(&renaming.mapping).map(expr)?;
    rv.reset_value();
    Ok(rv)
}

/// Substitute identifiers by name
pub fn inline(expr: Expression, substitutes: &[(String, Expression)]) -> EvalResult<Expression> {
    if substitutes.is_empty() {
        return Ok(expr);
    }
    let mut inliner = Inliner::new(substitutes.iter().map(|(n, e)| (n.as_str(), e)));
    let mut rv = inliner.map(expr)?;
    rv.reset_value();
    Ok(rv)
}

/// Substitute equivalent subexpressions
pub fn replace(expr: Expression, pairs: &[(Expression, Expression)]) -> EvalResult<Expression> {
    if pairs.is_empty() {
        return Ok(expr);
    }
    let mut rv = Replacer::new(pairs).map(expr)?;
    rv.reset_value();
    Ok(rv)
}

/// Copy of a quantifier or comprehension with its variables renamed to the
/// positional names in `to`
///
/// `None` if `expr` has no bindings or the renaming would capture another
/// variable, free in the bodies or bound by a nested scope; the flag tells
/// whether anything was renamed.
pub fn rename_bindings(expr: &Expression, to: &Bindings) -> Option<(Expression, bool)> {
    let bindings = expr.bindings()?;
    let renaming = bindings.rename_variables(to);
    match renaming.options {
        BindingVarOptions::Conflict => {
            trace!("cannot rename bindings of {expr}: conflict");
            return None;
        }
        BindingVarOptions::Same => return Some((expr.copy(), false)),
        BindingVarOptions::Differ => {}
    }
    let children = expr.children();
    let bodies = children.get(bindings.len()..).unwrap_or(&[]);
    if bodies.iter().any(|body| captures_in_body(body, &renaming)) {
        trace!("cannot rename bindings of {expr}: a new name is already used in the body");
        return None;
    }

    let mut copy = expr.copy();
    let names: HashMap<&str, &str> = renaming
        .mapping
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();
    if let Some(bindings) = copy.bindings_mut() {
        for b in bindings.iter_mut() {
            if let Some(new) = names.get(b.variable.as_str()) {
                b.variable = (*new).to_string();
            }
            if let Some(name) = &mut b.name_variable {
                if let Some(new) = names.get(name.as_str()) {
                    *name = (*new).to_string();
                }
            }
        }
    }

    let mut renamer = Renamer::new(&renaming.mapping);
    let rv = map_children_scoped(&mut copy, &mut |child, in_body| {
        if in_body { renamer.map(child) } else { Ok(child) }
    });
    if rv.is_err() {
        return None;
    }
    copy.reset_value();
    Some((copy, true))
}

/// A new name is read free in `body` or rebound by a scope nested in it
fn captures_in_body(body: &Expression, renaming: &Renaming) -> bool {
    let free = free_identifiers(body);
    if renaming.new_names().any(|n| free.iter().any(|f| f == n)) {
        return true;
    }
    let mut nested = false;
    let _ = traverse(body, &mut |e| {
        let rebinds = e
            .bindings()
            .is_some_and(|b| b.duplicate_variable(renaming.new_names()));
        Ok(if rebinds {
            nested = true;
            Visit::Stop
        } else {
            Visit::Descend
        })
    });
    nested
}
