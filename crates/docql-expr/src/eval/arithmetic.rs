//! Arithmetic and string concatenation

use crate::context::Context;
use crate::error::EvalResult;
use crate::expression::Expression;
use docql_value::{Number, Scope, Value};

/// Fold numeric operands; MISSING wins over NULL, any non-number gives NULL
fn fold_numbers(
    ops: &[Expression],
    item: &Scope<'_>,
    ctx: &dyn Context,
    op: fn(Number, Number) -> Number,
) -> EvalResult<Value> {
    let mut acc: Option<Number> = None;
    let mut null = false;
    for operand in ops {
        match operand.evaluate(item, ctx)? {
            Value::Missing => return Ok(Value::Missing),
            Value::Number(n) if !null => {
                acc = Some(match acc {
                    Some(a) => op(a, n),
                    None => n,
                });
            }
            Value::Number(_) => {}
            _ => null = true,
        }
    }
    Ok(match acc {
        Some(n) if !null => Value::Number(n),
        _ => Value::Null,
    })
}

/// Both operands as numbers, or the unknown result
fn numbers(
    a: &Expression,
    b: &Expression,
    item: &Scope<'_>,
    ctx: &dyn Context,
) -> EvalResult<Result<(Number, Number), Value>> {
    let first = a.evaluate(item, ctx)?;
    let second = b.evaluate(item, ctx)?;
    Ok(match (first, second) {
        (Value::Missing, _) | (_, Value::Missing) => Err(Value::Missing),
        (Value::Number(x), Value::Number(y)) => Ok((x, y)),
        _ => Err(Value::Null),
    })
}

pub(super) fn add(ops: &[Expression], item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    fold_numbers(ops, item, ctx, Number::add)
}

pub(super) fn mult(ops: &[Expression], item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    fold_numbers(ops, item, ctx, Number::mul)
}

pub(super) fn sub(a: &Expression, b: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(match numbers(a, b, item, ctx)? {
        Ok((x, y)) => Value::Number(x.sub(y)),
        Err(unknown) => unknown,
    })
}

/// Division by zero is NULL
pub(super) fn div(a: &Expression, b: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(match numbers(a, b, item, ctx)? {
        Ok((x, y)) => x.div(y).map_or(Value::Null, Value::Number),
        Err(unknown) => unknown,
    })
}

pub(super) fn modulo(a: &Expression, b: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(match numbers(a, b, item, ctx)? {
        Ok((x, y)) => x.rem(y).map_or(Value::Null, Value::Number),
        Err(unknown) => unknown,
    })
}

pub(super) fn neg(a: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(match a.evaluate(item, ctx)? {
        Value::Missing => Value::Missing,
        Value::Number(n) => Value::Number(n.neg()),
        _ => Value::Null,
    })
}

/// `a || b`: strings only
pub(super) fn concat(ops: &[Expression], item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let mut out = ctx.pools().text.get();
    let mut null = false;
    for operand in ops {
        match operand.evaluate(item, ctx)? {
            Value::Missing => return Ok(Value::Missing),
            Value::String(s) if !null => out.push_str(&s),
            Value::String(_) => {}
            _ => null = true,
        }
    }
    Ok(if null {
        Value::Null
    } else {
        Value::string(out.as_str())
    })
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
    #[case(E::add(vec![E::constant(1), E::constant(2.5)]), Value::float(3.5))]
    #[case(E::add(vec![E::constant(1), E::null(), E::missing()]), Value::Missing)]
    #[case(E::add(vec![E::constant(1), E::constant("x")]), Value::Null)]
    #[case(E::mult(vec![E::constant(3), E::constant(4)]), Value::int(12))]
    #[case(E::sub(E::constant(3), E::constant(4)), Value::int(-1))]
    #[case(E::div(E::constant(7), E::constant(2)), Value::float(3.5))]
    #[case(E::div(E::constant(7), E::constant(0)), Value::Null)]
    #[case(E::modulo(E::constant(7), E::constant(0)), Value::Null)]
    #[case(E::modulo(E::constant(7), E::constant(3)), Value::int(1))]
    #[case(E::neg(E::constant("x")), Value::Null)]
    #[case(E::neg(E::missing()), Value::Missing)]
    #[case(E::concat(vec![E::constant("a"), E::constant("b")]), Value::string("ab"))]
    #[case(E::concat(vec![E::constant("a"), E::constant(1)]), Value::Null)]
    #[case(E::concat(vec![E::null(), E::missing()]), Value::Missing)]
    fn test_arithmetic(#[case] e: E, #[case] expected: Value) {
        assert_eq!(eval(e), expected);
    }
}
