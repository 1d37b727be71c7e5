//! AND / OR / NOT under three-valued logic

use crate::context::Context;
use crate::error::EvalResult;
use crate::expression::Expression;
use docql_value::{Scope, Value};

/// FALSE if any operand is false, else MISSING, else NULL, else TRUE
pub(super) fn and(ops: &[Expression], item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let mut missing = false;
    let mut null = false;
    for operand in ops {
        match operand.evaluate(item, ctx)? {
            Value::Missing => missing = true,
            Value::Null => null = true,
            v if !v.truth() => return Ok(Value::FALSE),
            _ => {}
        }
    }
    Ok(if missing {
        Value::Missing
    } else if null {
        Value::Null
    } else {
        Value::TRUE
    })
}

/// TRUE if any operand is true, else NULL, else MISSING, else FALSE
pub(super) fn or(ops: &[Expression], item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let mut missing = false;
    let mut null = false;
    for operand in ops {
        match operand.evaluate(item, ctx)? {
            Value::Missing => missing = true,
            Value::Null => null = true,
            v if v.truth() => return Ok(Value::TRUE),
            _ => {}
        }
    }
    Ok(if null {
        Value::Null
    } else if missing {
        Value::Missing
    } else {
        Value::FALSE
    })
}

pub(super) fn not(a: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(match a.evaluate(item, ctx)? {
        Value::Missing => Value::Missing,
        Value::Null => Value::Null,
        v => Value::Boolean(!v.truth()),
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
    #[case(vec![E::boolean(true), E::missing(), E::boolean(false)], Value::FALSE)]
    #[case(vec![E::boolean(true), E::missing(), E::null()], Value::Missing)]
    #[case(vec![E::boolean(true), E::null()], Value::Null)]
    #[case(vec![E::boolean(true), E::constant(1)], Value::TRUE)]
    fn test_and(#[case] ops: Vec<E>, #[case] expected: Value) {
        assert_eq!(eval(E::and(ops)), expected);
    }

    #[rstest]
    #[case(vec![E::boolean(false), E::missing(), E::boolean(true)], Value::TRUE)]
    #[case(vec![E::boolean(false), E::missing(), E::null()], Value::Null)]
    #[case(vec![E::boolean(false), E::missing()], Value::Missing)]
    #[case(vec![E::boolean(false), E::constant("")], Value::FALSE)]
    fn test_or(#[case] ops: Vec<E>, #[case] expected: Value) {
        assert_eq!(eval(E::or(ops)), expected);
    }

    #[test]
    fn test_not() {
        assert_eq!(eval(E::not(E::boolean(true))), Value::FALSE);
        assert_eq!(eval(E::not(E::constant(0))), Value::TRUE);
        assert_eq!(eval(E::not(E::null())), Value::Null);
    }
}
