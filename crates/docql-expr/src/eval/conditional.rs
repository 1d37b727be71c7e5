//! CASE expressions

use crate::context::Context;
use crate::error::EvalResult;
use crate::expression::{Expression, WhenTerm};
use docql_value::{Scope, Value};

/// `CASE WHEN c THEN r ... [ELSE e] END`; NULL when nothing matches
pub(super) fn searched_case(
    whens: &[WhenTerm],
    else_term: Option<&Expression>,
    item: &Scope<'_>,
    ctx: &dyn Context,
) -> EvalResult<Value> {
    for term in whens {
        if term.when.evaluate(item, ctx)?.truth() {
            return term.then.evaluate(item, ctx);
        }
    }
    otherwise(else_term, item, ctx)
}

/// `CASE s WHEN v THEN r ... [ELSE e] END`, matching with `=`
pub(super) fn simple_case(
    search: &Expression,
    whens: &[WhenTerm],
    else_term: Option<&Expression>,
    item: &Scope<'_>,
    ctx: &dyn Context,
) -> EvalResult<Value> {
    let s = search.evaluate(item, ctx)?;
    for term in whens {
        let candidate = term.when.evaluate(item, ctx)?;
        if s.equals(&candidate).truth() {
            return term.then.evaluate(item, ctx);
        }
    }
    otherwise(else_term, item, ctx)
}

fn otherwise(else_term: Option<&Expression>, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    match else_term {
        Some(e) => e.evaluate(item, ctx),
        None => Ok(Value::Null),
    }
}
