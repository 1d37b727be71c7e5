//! Constant removal for filter predicates
//!
//! Operates on predicate positions only: the root and the operands of
//! AND/OR. A predicate whose value is known statically becomes a boolean
//! literal under filter truth, so NULL and MISSING fold to FALSE.

use crate::error::EvalResult;
use crate::expression::{ExprKind, Expression};

/// Fold statically known predicates and simplify AND/OR around them
///
/// Only for an expression in filter position (a WHERE, ON or HAVING
/// condition), where NULL and MISSING reject the row just as FALSE does.
/// Callers must not apply it elsewhere: a projected `NULL = 1` would read
/// FALSE instead of NULL.
pub fn remove_constants(expr: Expression) -> EvalResult<Expression> {
    // AND drops TRUE operands and is decided by FALSE; OR is the dual
    let conjunction = match expr.kind() {
        ExprKind::And(_) => Some(true),
        ExprKind::Or(_) => Some(false),
        _ => None,
    };
    let Some(conjunction) = conjunction else {
        let known = expr.value().map(|v| v.truth());
        return Ok(match known {
            Some(t) => Expression::boolean(t),
            None => expr,
        });
    };

    let span = expr.span();
    let operands = match expr.into_kind() {
        ExprKind::And(ops) | ExprKind::Or(ops) => ops,
        _ => Vec::new(),
    };

    let mut kept = Vec::with_capacity(operands.len());
    for op in operands {
        let op = remove_constants(op)?;
        match op.as_constant().map(|v| v.truth()) {
            Some(t) if t == conjunction => {}
            Some(_) => return Ok(Expression::boolean(!conjunction)),
            None => kept.push(op),
        }
    }

    let mut rv = match kept.len() {
        0 => Expression::boolean(conjunction),
        1 => kept.pop().unwrap_or_else(|| Expression::boolean(conjunction)),
        _ if conjunction => Expression::and(kept),
        _ => Expression::or(kept),
    };
    if let Some(span) = span {
        rv = rv.with_span(span);
    }
    Ok(rv)
}
