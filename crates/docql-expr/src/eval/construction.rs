//! Array and object constructors

use crate::context::Context;
use crate::error::EvalResult;
use crate::expression::Expression;
use docql_value::{Object, Scope, Value};

/// `[a, b, ...]`; MISSING elements become NULL
pub(super) fn array(ops: &[Expression], item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let mut items = Vec::with_capacity(ops.len());
    for operand in ops {
        items.push(match operand.evaluate(item, ctx)? {
            Value::Missing => Value::Null,
            v => v,
        });
    }
    Ok(Value::Array(items))
}

/// `{"a": x, ...}`; MISSING values are left out
pub(super) fn object(entries: &[(String, Expression)], item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let mut fields = Object::with_capacity(entries.len());
    for (name, operand) in entries {
        let v = operand.evaluate(item, ctx)?;
        if !v.is_missing() {
            fields.insert(name.clone(), v);
        }
    }
    Ok(Value::Object(fields))
}

#[cfg(test)]
mod tests {
    use crate::context::ExecutionContext;
    use crate::expression::Expression as E;
    use docql_value::{Scope, Value};
    use serde_json::json;

    #[test]
    fn test_constructors() {
        let ctx = ExecutionContext::new();
        let arr = E::array_construct(vec![E::constant(1), E::missing(), E::null()]);
        assert_eq!(
            arr.evaluate(&Scope::empty(), &ctx).unwrap(),
            Value::from(json!([1, null, null]))
        );

        let obj = E::object_construct(vec![
            ("b".into(), E::constant(2)),
            ("a".into(), E::missing()),
            ("c".into(), E::null()),
        ]);
        assert_eq!(
            obj.evaluate(&Scope::empty(), &ctx).unwrap(),
            Value::from(json!({"b": 2, "c": null}))
        );
    }
}
