//! Conjunct removal

use crate::expression::{ExprKind, Expression};

/// Remove every conjunct equivalent to `remove` from an AND tree
///
/// Only AND boundaries are searched, nested ANDs included. `None` when
/// nothing remains; a single remaining term replaces its AND.
pub fn remove_expr(expr: Expression, remove: &Expression) -> Option<Expression> {
    if !matches!(expr.kind(), ExprKind::And(_)) {
        return (!expr.equivalent_to(remove)).then_some(expr);
    }

    let span = expr.span();
    let ExprKind::And(operands) = expr.into_kind() else {
        return None;
    };
    let mut terms: Vec<Expression> = operands
        .into_iter()
        .filter_map(|op| remove_expr(op, remove))
        .collect();

    let rv = match terms.len() {
        0 => return None,
        1 => terms.pop()?,
        _ => Expression::and(terms),
    };
    Some(match span {
        Some(span) => rv.with_span(span),
        None => rv,
    })
}
