//! Builtin function table

use super::{BuiltinFunction, ResultType};
use crate::context::Context;
use crate::error::EvalResult;
use docql_value::{Scope, Value, ValueType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;

const fn scalar(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    result: ResultType,
    eval: super::BuiltinFn,
) -> BuiltinFunction {
    BuiltinFunction {
        name,
        min_args,
        max_args,
        commutative: false,
        volatile: false,
        conditional: false,
        propagates_missing: true,
        propagates_null: true,
        result,
        eval,
    }
}

/// Scalar that sees MISSING and NULL operands itself
const fn unknown_aware(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    conditional: bool,
    result: ResultType,
    eval: super::BuiltinFn,
) -> BuiltinFunction {
    BuiltinFunction {
        conditional,
        propagates_missing: false,
        propagates_null: false,
        ..scalar(name, min_args, max_args, result, eval)
    }
}

pub static BUILTINS: &[BuiltinFunction] = &[
    // Conditionals over unknowns
    unknown_aware("decode", 3, None, true, ResultType::Json, decode),
    unknown_aware("ifmissing", 2, None, true, ResultType::CommonArgs, if_missing),
    unknown_aware("ifnull", 2, None, true, ResultType::CommonArgs, if_null),
    unknown_aware("ifmissingornull", 2, None, true, ResultType::CommonArgs, if_missing_or_null),
    scalar("missingif", 2, Some(2), ResultType::FirstArg, missing_if),
    scalar("nullif", 2, Some(2), ResultType::FirstArg, null_if),
    // Comparison
    BuiltinFunction {
        commutative: true,
        ..unknown_aware("greatest", 2, None, false, ResultType::CommonArgs, greatest)
    },
    BuiltinFunction {
        commutative: true,
        ..unknown_aware("least", 2, None, false, ResultType::CommonArgs, least)
    },
    // Numbers and strings
    scalar("abs", 1, Some(1), ResultType::Fixed(ValueType::Number), abs),
    scalar("lower", 1, Some(1), ResultType::Fixed(ValueType::String), lower),
    scalar("upper", 1, Some(1), ResultType::Fixed(ValueType::String), upper),
    scalar("length", 1, Some(1), ResultType::Fixed(ValueType::Number), length),
    scalar("array_length", 1, Some(1), ResultType::Fixed(ValueType::Number), array_length),
    // Types and metadata
    unknown_aware("type", 1, Some(1), false, ResultType::Fixed(ValueType::String), type_name),
    unknown_aware("meta", 0, Some(1), false, ResultType::Fixed(ValueType::Object), meta),
    // Volatile
    BuiltinFunction {
        volatile: true,
        ..scalar("now_millis", 0, Some(0), ResultType::Fixed(ValueType::Number), now_millis)
    },
    BuiltinFunction {
        volatile: true,
        ..scalar("random", 0, Some(1), ResultType::Fixed(ValueType::Number), random)
    },
    // Index keys
    unknown_aware("flatten_keys", 1, None, false, ResultType::Fixed(ValueType::Array), flatten_keys),
];

/// `decode(expr, search1, result1, ..., [default])`
fn decode(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    let Some((expr, rest)) = args.split_first() else {
        return Ok(Value::Null);
    };
    let mut pairs = rest.chunks_exact(2);
    for pair in pairs.by_ref() {
        if expr.collate(&pair[0]) == Ordering::Equal {
            return Ok(pair[1].clone());
        }
    }
    Ok(pairs.remainder().first().cloned().unwrap_or(Value::Null))
}

fn if_missing(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(first_where(args, |v| !v.is_missing()))
}

fn if_null(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(first_where(args, |v| !v.is_null()))
}

fn if_missing_or_null(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(first_where(args, |v| !v.is_unknown()))
}

fn first_where(args: &[Value], keep: impl Fn(&Value) -> bool) -> Value {
    args.iter().find(|v| keep(v)).cloned().unwrap_or(Value::Null)
}

fn missing_if(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(if args[0].equals(&args[1]).truth() {
        Value::Missing
    } else {
        args[0].clone()
    })
}

fn null_if(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(if args[0].equals(&args[1]).truth() {
        Value::Null
    } else {
        args[0].clone()
    })
}

fn greatest(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(extreme(args, Ordering::Greater))
}

fn least(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(extreme(args, Ordering::Less))
}

/// Most extreme known operand; NULL when every operand is unknown
fn extreme(args: &[Value], wanted: Ordering) -> Value {
    args.iter()
        .filter(|v| !v.is_unknown())
        .fold(None::<&Value>, |best, v| match best {
            Some(b) if v.collate(b) != wanted => Some(b),
            _ => Some(v),
        })
        .cloned()
        .unwrap_or(Value::Null)
}

fn abs(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(args[0]
        .as_number()
        .map_or(Value::Null, |n| Value::Number(n.abs())))
}

fn lower(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(args[0]
        .as_str()
        .map_or(Value::Null, |s| Value::string(s.to_lowercase())))
}

fn upper(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(args[0]
        .as_str()
        .map_or(Value::Null, |s| Value::string(s.to_uppercase())))
}

fn length(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(args[0]
        .as_str()
        .map_or(Value::Null, |s| Value::int(s.chars().count() as i64)))
}

fn array_length(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(args[0]
        .as_array()
        .map_or(Value::Null, |a| Value::int(a.len() as i64)))
}

fn type_name(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(Value::string(args[0].type_of().name()))
}

/// Metadata annotated on the current item
fn meta(_: &[Value], item: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(item
        .attachments()
        .and_then(|a| a.get("meta"))
        .cloned()
        .unwrap_or(Value::Missing))
}

fn now_millis(_: &[Value], _: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(Value::float(ctx.now().timestamp_millis() as f64))
}

fn random(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    let sample = match args.first() {
        Some(seed) => match seed.as_number().and_then(|n| n.as_i64()) {
            Some(seed) => StdRng::seed_from_u64(seed as u64).r#gen::<f64>(),
            None => return Ok(Value::Null),
        },
        None => rand::thread_rng().r#gen::<f64>(),
    };
    Ok(Value::float(sample))
}

/// Operand values as one array key; MISSING operands become NULL
fn flatten_keys(args: &[Value], _: &Scope<'_>, _: &dyn Context) -> EvalResult<Value> {
    Ok(Value::array(args.iter().map(|v| match v {
        Value::Missing => Value::Null,
        other => other.clone(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use rstest::rstest;

    fn call(name: &str, args: Vec<Value>) -> Value {
        let ctx = ExecutionContext::new();
        let function = super::super::lookup(name).unwrap();
        (function.eval)(&args, &Scope::empty(), &ctx).unwrap()
    }

    #[rstest]
    #[case(vec![Value::int(2), Value::int(1), "a".into(), Value::int(2), "b".into(), "z".into()], "b".into())]
    #[case(vec![Value::int(9), Value::int(1), "a".into(), "z".into()], "z".into())]
    #[case(vec![Value::int(9), Value::int(1), "a".into()], Value::Null)]
    #[case(vec![Value::Null, Value::Null, "n".into()], "n".into())]
    fn test_decode(#[case] args: Vec<Value>, #[case] expected: Value) {
        assert_eq!(call("decode", args), expected);
    }

    #[rstest]
    #[case("ifmissing", vec![Value::Missing, Value::Null, Value::int(1)], Value::Null)]
    #[case("ifnull", vec![Value::Null, Value::Missing, Value::int(1)], Value::Missing)]
    #[case("ifmissingornull", vec![Value::Missing, Value::Null, Value::int(1)], Value::int(1))]
    #[case("ifmissingornull", vec![Value::Missing, Value::Null], Value::Null)]
    #[case("greatest", vec![Value::int(1), Value::Null, Value::int(5), "a".into()], "a".into())]
    #[case("least", vec![Value::Missing, Value::int(3), Value::int(2)], Value::int(2))]
    #[case("nullif", vec![Value::int(1), Value::int(1)], Value::Null)]
    #[case("missingif", vec![Value::int(1), Value::int(1)], Value::Missing)]
    #[case("missingif", vec![Value::int(1), Value::int(2)], Value::int(1))]
    #[case("type", vec![Value::Missing], "missing".into())]
    #[case("length", vec!["héllo".into()], Value::int(5))]
    #[case("flatten_keys", vec![Value::int(1), Value::Missing], Value::array([Value::int(1), Value::Null]))]
    fn test_builtins(#[case] name: &str, #[case] args: Vec<Value>, #[case] expected: Value) {
        assert_eq!(call(name, args), expected);
    }

    #[test]
    fn test_seeded_random_is_stable() {
        let a = call("random", vec![Value::int(7)]);
        let b = call("random", vec![Value::int(7)]);
        assert_eq!(a, b);
    }
}
