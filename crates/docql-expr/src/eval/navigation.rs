//! Identifiers, paths, elements and slices

use crate::context::Context;
use crate::error::EvalResult;
use crate::expression::{ExprKind, Expression};
use docql_value::{Scope, Value};

pub(super) fn identifier(name: &str, case_insensitive: bool, item: &Scope<'_>) -> Value {
    let found = if case_insensitive {
        item.lookup_ci(name)
    } else {
        item.lookup(name)
    };
    found.cloned().unwrap_or(Value::Missing)
}

/// Value an index supplied for a covered expression
pub(super) fn covered_value(text: &str, item: &Scope<'_>) -> Value {
    item.attachments()
        .and_then(|a| a.get("covers"))
        .and_then(|covers| covers.get_field(text))
        .cloned()
        .unwrap_or(Value::Missing)
}

/// `a.b`: MISSING unless `a` is an object
pub(super) fn field(a: &Expression, name: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let base = a.evaluate(item, ctx)?;
    let Value::Object(_) = &base else {
        return Ok(Value::Missing);
    };

    if let ExprKind::FieldName(n) = name.kind() {
        return Ok(if name.is_case_insensitive() {
            base.field_ci(n)
        } else {
            base.field(n)
        });
    }

    Ok(match name.evaluate(item, ctx)? {
        Value::String(n) => base.field(&n),
        Value::Missing => Value::Missing,
        _ => Value::Null,
    })
}

/// `a[i]`: arrays by position, objects by computed field name
pub(super) fn element(a: &Expression, index: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let base = a.evaluate(item, ctx)?;
    let index = index.evaluate(item, ctx)?;
    Ok(match (&base, &index) {
        (Value::Missing, _) | (_, Value::Missing) => Value::Missing,
        (Value::Array(_), Value::Number(n)) => match n.as_i64() {
            Some(i) => base.index(i),
            None => Value::Null,
        },
        (Value::Object(_), Value::String(name)) => base.field(name),
        (Value::Null, _) | (_, Value::Null) => Value::Null,
        _ => Value::Missing,
    })
}

/// `a[start : end]`; NULL unless `a` is an array and the bounds are integers
pub(super) fn slice(
    a: &Expression,
    start: &Expression,
    end: Option<&Expression>,
    item: &Scope<'_>,
    ctx: &dyn Context,
) -> EvalResult<Value> {
    let base = a.evaluate(item, ctx)?;
    let start = start.evaluate(item, ctx)?;
    let end = match end {
        Some(e) => Some(e.evaluate(item, ctx)?),
        None => None,
    };

    if base.is_missing() || start.is_missing() || end.as_ref().is_some_and(Value::is_missing) {
        return Ok(Value::Missing);
    }
    if !matches!(base, Value::Array(_)) {
        return Ok(Value::Null);
    }
    let Some(start) = start.as_number().and_then(|n| n.as_i64()) else {
        return Ok(Value::Null);
    };
    let end = match end {
        Some(v) => match v.as_number().and_then(|n| n.as_i64()) {
            Some(e) => Some(e),
            None => return Ok(Value::Null),
        },
        None => None,
    };
    Ok(base.slice(start, end))
}

#[cfg(test)]
mod tests {
    use crate::context::ExecutionContext;
    use crate::expression::Expression as E;
    use docql_value::{Attachments, Scope, Value};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn doc() -> Value {
        Value::from(json!({
            "name": "widget",
            "Tags": ["a", "b", "c"],
            "dims": {"w": 2, "h": 3},
            "nothing": null
        }))
    }

    #[rstest]
    #[case(E::identifier("name"), Value::string("widget"))]
    #[case(E::identifier("absent"), Value::Missing)]
    #[case(E::identifier_ci("TAGS"), Value::from(json!(["a", "b", "c"])))]
    #[case(E::path("dims", &["w"]), Value::int(2))]
    #[case(E::path("nothing", &["w"]), Value::Missing)]
    #[case(E::field(E::identifier("name"), "w"), Value::Missing)]
    #[case(E::field_expr(E::identifier("dims"), E::constant("h")), Value::int(3))]
    #[case(E::element(E::identifier("Tags"), E::constant(-1)), Value::string("c"))]
    #[case(E::element(E::identifier("Tags"), E::constant(9)), Value::Missing)]
    #[case(E::element(E::identifier("dims"), E::constant("w")), Value::int(2))]
    #[case(E::element(E::identifier("nothing"), E::constant(0)), Value::Null)]
    #[case(E::slice(E::identifier("Tags"), E::constant(1), None), Value::from(json!(["b", "c"])))]
    #[case(E::slice(E::identifier("Tags"), E::constant(0), Some(E::constant(2))), Value::from(json!(["a", "b"])))]
    #[case(E::slice(E::identifier("name"), E::constant(0), None), Value::Null)]
    #[case(E::self_ref(), doc())]
    fn test_navigation(#[case] e: E, #[case] expected: Value) {
        let doc = doc();
        let scope = Scope::new(&doc);
        let rv = e.evaluate(&scope, &ExecutionContext::new()).unwrap();
        assert_eq!(rv, expected);
    }

    #[test]
    fn test_cover_reads_attachments() {
        let inner = E::path("d", &["x"]);
        let text = inner.to_string();
        let covered = E::cover(inner);
        let mut attachments = Attachments::new();
        attachments.insert("covers".into(), Value::object([(text, Value::int(7))]));
        let scope = Scope::empty().with_attachments(&attachments);
        let rv = covered.evaluate(&scope, &ExecutionContext::new()).unwrap();
        assert_eq!(rv, Value::int(7));
    }
}
