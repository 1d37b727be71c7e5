//! Comparison and null tests

use crate::context::Context;
use crate::error::EvalResult;
use crate::expression::Expression;
use docql_value::{Comparison, Scope, Value};
use std::cmp::Ordering;

fn ordered(a: &Value, b: &Value, accept: impl Fn(Ordering) -> bool) -> Value {
    match a.compare(b) {
        Comparison::Missing => Value::Missing,
        Comparison::Null => Value::Null,
        Comparison::Order(o) => Value::Boolean(accept(o)),
    }
}

pub(super) fn equal(a: &Expression, b: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let first = a.evaluate(item, ctx)?;
    let second = b.evaluate(item, ctx)?;
    Ok(first.equals(&second))
}

pub(super) fn less_than(a: &Expression, b: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let first = a.evaluate(item, ctx)?;
    let second = b.evaluate(item, ctx)?;
    Ok(ordered(&first, &second, |o| o == Ordering::Less))
}

pub(super) fn less_or_equal(
    a: &Expression,
    b: &Expression,
    item: &Scope<'_>,
    ctx: &dyn Context,
) -> EvalResult<Value> {
    let first = a.evaluate(item, ctx)?;
    let second = b.evaluate(item, ctx)?;
    Ok(ordered(&first, &second, |o| o != Ordering::Greater))
}

/// MISSING if any operand is MISSING, then NULL, else `low <= a <= high`
pub(super) fn between(
    a: &Expression,
    low: &Expression,
    high: &Expression,
    item: &Scope<'_>,
    ctx: &dyn Context,
) -> EvalResult<Value> {
    let values = [
        a.evaluate(item, ctx)?,
        low.evaluate(item, ctx)?,
        high.evaluate(item, ctx)?,
    ];
    if values.iter().any(Value::is_missing) {
        return Ok(Value::Missing);
    }
    if values.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    let [v, low, high] = &values;
    Ok(Value::Boolean(
        low.collate(v) != Ordering::Greater && v.collate(high) != Ordering::Greater,
    ))
}

pub(super) fn like(a: &Expression, pattern: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let first = a.evaluate(item, ctx)?;
    let second = pattern.evaluate(item, ctx)?;
    match (&first, &second) {
        (Value::Missing, _) | (_, Value::Missing) => Ok(Value::Missing),
        (Value::String(s), Value::String(p)) => {
            let re = ctx.like_pattern(p)?;
            Ok(Value::Boolean(re.is_match(s)))
        }
        _ => Ok(Value::Null),
    }
}

pub(super) fn is_missing(a: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(Value::Boolean(a.evaluate(item, ctx)?.is_missing()))
}

pub(super) fn is_not_missing(a: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(Value::Boolean(!a.evaluate(item, ctx)?.is_missing()))
}

pub(super) fn is_null(a: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(match a.evaluate(item, ctx)? {
        Value::Missing => Value::Missing,
        v => Value::Boolean(v.is_null()),
    })
}

pub(super) fn is_not_null(a: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(match a.evaluate(item, ctx)? {
        Value::Missing => Value::Missing,
        v => Value::Boolean(!v.is_null()),
    })
}

pub(super) fn is_valued(a: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(Value::Boolean(!a.evaluate(item, ctx)?.is_unknown()))
}

pub(super) fn is_not_valued(a: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(Value::Boolean(a.evaluate(item, ctx)?.is_unknown()))
}

#[cfg(test)]
mod tests {
    use crate::context::ExecutionContext;
    use crate::expression::Expression as E;
    use docql_value::{Scope, Value};
    use rstest::rstest;

    fn eval(e: E) -> Value {
        e.evaluate(&Scope::empty(), &ExecutionContext::new()).unwrap()
    }

    #[rstest]
    #[case(E::between(E::constant(1), E::constant(2), E::constant(3)), Value::FALSE)]
    #[case(E::between(E::constant(2), E::constant(2), E::constant(3)), Value::TRUE)]
    #[case(E::between(E::null(), E::constant(2), E::missing()), Value::Missing)]
    #[case(E::between(E::constant(2), E::null(), E::constant(3)), Value::Null)]
    #[case(E::equal(E::constant(1), E::constant(1.0)), Value::TRUE)]
    #[case(E::equal(E::null(), E::missing()), Value::Missing)]
    #[case(E::not_equal(E::constant(1), E::constant(2)), Value::TRUE)]
    #[case(E::less_than(E::constant(1), E::constant("a")), Value::TRUE)]
    #[case(E::greater_than(E::constant(1), E::constant(2)), Value::FALSE)]
    #[case(E::greater_or_equal(E::constant(2), E::constant(2)), Value::TRUE)]
    #[case(E::less_than(E::null(), E::constant(1)), Value::Null)]
    #[case(E::like(E::constant("abc"), E::constant("a%")), Value::TRUE)]
    #[case(E::like(E::constant(1), E::constant("a%")), Value::Null)]
    #[case(E::is_null(E::missing()), Value::Missing)]
    #[case(E::is_not_null(E::constant(0)), Value::TRUE)]
    #[case(E::is_missing(E::missing()), Value::TRUE)]
    #[case(E::is_valued(E::null()), Value::FALSE)]
    #[case(E::is_not_valued(E::missing()), Value::TRUE)]
    fn test_comparison(#[case] e: E, #[case] expected: Value) {
        assert_eq!(eval(e), expected);
    }

    #[test]
    fn test_invalid_like_pattern_is_not_an_error_for_escapes() {
        let e = E::like(E::constant("a(b"), E::constant("a(%"));
        assert_eq!(eval(e), Value::TRUE);
    }
}
