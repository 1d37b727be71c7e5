//! Binding analysis for array index matching
//!
//! A predicate such as `ANY v IN d.tags SATISFIES v = 1 END` can use an
//! index on `ALL ARRAY t FOR t IN d.tags END` once its variables are renamed
//! to the index's.

use super::rename_bindings;
use crate::binding::{BindingVarOptions, Bindings};
use crate::error::{EvalError, EvalResult};
use crate::expression::{ExprKind, Expression};
use log::debug;

/// Operators whose operands are searched for nested quantifiers
fn is_transparent(expr: &Expression) -> bool {
    matches!(
        expr.kind(),
        ExprKind::Add(_)
            | ExprKind::Sub(..)
            | ExprKind::Mult(_)
            | ExprKind::Div(..)
            | ExprKind::Mod(..)
            | ExprKind::Neg(_)
            | ExprKind::SearchedCase { .. }
            | ExprKind::SimpleCase { .. }
            | ExprKind::In(_)
            | ExprKind::Between(..)
            | ExprKind::Eq(..)
            | ExprKind::LE(..)
            | ExprKind::LT(..)
            | ExprKind::Like(..)
            | ExprKind::Not(_)
            | ExprKind::And(_)
            | ExprKind::Or(_)
            | ExprKind::Function(_)
    )
}

/// Every binding list introduced by ANY / ANY AND EVERY / ALL in `expr`,
/// outermost first
pub fn bindings_for(expr: &Expression) -> Vec<&Bindings> {
    let mut out = Vec::new();
    collect_bindings(expr, &mut out);
    out
}

fn collect_bindings<'a>(expr: &'a Expression, out: &mut Vec<&'a Bindings>) {
    match expr.kind() {
        ExprKind::Any(pred) | ExprKind::AnyEvery(pred) => {
            out.push(&pred.bindings);
            collect_bindings(&pred.satisfies, out);
        }
        ExprKind::All(_) => {
            let mut current = expr;
            while let Some(map) = current.array_key_map() {
                out.push(&map.bindings);
                current = &map.mapping;
            }
        }
        _ if is_transparent(expr) => {
            for child in expr.children() {
                collect_bindings(child, out);
            }
        }
        _ => {}
    }
}

/// Top-level bindings of an ANY, ANY AND EVERY or array index key
fn top_bindings(expr: &Expression) -> Option<&Bindings> {
    match expr.kind() {
        ExprKind::All(_) => expr.array_key_map().map(|m| &m.bindings),
        ExprKind::Any(pred) | ExprKind::AnyEvery(pred) => Some(&pred.bindings),
        _ => None,
    }
}

/// Whether the quantifiers in `from` can take the variable names of `to`
///
/// `Same` when nothing needs renaming or there is nothing to compare.
/// Names introduced by the renaming must not collide with `aliases`
/// (keyspace, LET and WITH names) or with nested binding variables.
pub fn has_renameable_bindings(from: Option<&Expression>, to: &Expression, aliases: &[&str]) -> BindingVarOptions {
    let Some(to_bindings) = top_bindings(to).filter(|b| !b.is_empty()) else {
        return BindingVarOptions::Same;
    };
    let Some(from) = from else {
        return BindingVarOptions::Same;
    };
    let from_bindings = bindings_for(from);
    let Some((outer, nested)) = from_bindings.split_first() else {
        return BindingVarOptions::Same;
    };

    let renaming = outer.rename_variables(to_bindings);
    if renaming.is_conflict() || renaming.mapping.is_empty() {
        return renaming.options;
    }
    if renaming.new_names().any(|n| aliases.contains(&n)) {
        debug!("renamed binding variable collides with an alias in {from}");
        return BindingVarOptions::Conflict;
    }
    if nested.iter().any(|b| b.duplicate_variable(renaming.new_names())) {
        debug!("renamed binding variable collides with a nested variable in {from}");
        return BindingVarOptions::Conflict;
    }
    renaming.options
}

/// Collect top-level ANY predicates of `exprs` that match `array_key`
///
/// Returns `(original, renamed)` pairs, the renamed copy using the index
/// key's variable names. With `replace_only`, predicates that need no
/// renaming are left out. A renaming conflict, or a correlated subquery
/// inside a renamed predicate, is an error; callers treat it as "no match".
pub fn gather_any(
    exprs: &[Expression],
    array_key: &Expression,
    replace_only: bool,
) -> EvalResult<Vec<(Expression, Expression)>> {
    let mut gather = GatherAny {
        level: 0,
        renamed: false,
        replace_only,
        anys: Vec::new(),
    };
    for expr in exprs {
        gather.visit(expr, array_key)?;
    }
    Ok(gather.anys)
}

struct GatherAny {
    level: usize,
    renamed: bool,
    replace_only: bool,
    anys: Vec<(Expression, Expression)>,
}

impl GatherAny {
    fn visit(&mut self, expr: &Expression, key: &Expression) -> EvalResult<()> {
        match expr.kind() {
            ExprKind::Any(_) => self.visit_any(expr, key),
            ExprKind::Subquery(plan) if self.renamed && plan.is_correlated() => Err(EvalError::binding_conflict(
                "binding variables differ and subquery is correlated",
            )),
            _ if is_transparent(expr) => {
                for child in expr.children() {
                    self.visit(child, key)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn visit_any(&mut self, expr: &Expression, key: &Expression) -> EvalResult<()> {
        let (Some(map), Some(bindings)) = (key.array_key_map(), expr.bindings()) else {
            return Ok(());
        };
        if !bindings.equivalent_expressions(&map.bindings) {
            return Ok(());
        }

        let Some((renamed, changed)) = rename_bindings(expr, &map.bindings) else {
            return Err(EvalError::binding_conflict(format!("cannot rename bindings of {expr}")));
        };
        let ExprKind::Any(pred) = renamed.kind() else {
            return Err(EvalError::binding_conflict(format!("cannot rename bindings of {expr}")));
        };

        let mut nested = GatherAny {
            level: self.level + 1,
            renamed: changed,
            replace_only: self.replace_only,
            anys: Vec::new(),
        };
        nested.visit(&pred.satisfies, &map.mapping)?;

        if self.level == 0 && (!self.replace_only || changed) {
            self.anys.push((expr.copy(), renamed));
        }
        Ok(())
    }
}
