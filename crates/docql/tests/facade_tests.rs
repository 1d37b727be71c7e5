//! Text-in, value-out use of the facade

use docql::{CoveredResult, Error, ExecutionContext, Value, covered, evaluate};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn doc() -> Value {
    Value::from(json!({
        "name": "widget",
        "tags": ["red", "blue"],
        "dims": {"w": 3, "h": 4},
        "parts": [{"id": 1, "qty": 2}, {"id": 2, "qty": 0}, {"id": 3}]
    }))
}

#[rstest]
#[case("dims.w * dims.h", json!(12))]
#[case("any t in tags satisfies t = 'blue' end", json!(true))]
#[case("every p in parts satisfies p.qty > 0 end", json!(false))]
#[case("array p.id for p in parts when p.qty is missing end", json!([3]))]
#[case("first p.id for p in parts when p.qty = 0 end", json!(2))]
#[case("object t : length(t) for t in tags when t != 'red' end", json!({"blue": 4}))]
#[case("case when array_length(tags) > 1 then 'many' else 'few' end", json!("many"))]
#[case("upper(name) like 'WID%'", json!(true))]
#[case("tags[0:1]", json!(["red"]))]
fn test_evaluate_text(#[case] source: &str, #[case] expected: serde_json::Value) {
    let rv = evaluate(source, &doc(), &ExecutionContext::new()).unwrap();
    assert_eq!(rv, Value::from(expected));
}

#[test]
fn test_errors_keep_their_kind() {
    let ctx = ExecutionContext::new();
    assert!(matches!(evaluate("tags[", &doc(), &ctx), Err(Error::Parse(_))));
    assert!(matches!(evaluate("nosuch_fn(1)", &doc(), &ctx), Err(Error::Eval(_))));
}

#[rstest]
#[case("d.a > 1 and d.b = 'x'", "d.a, d.b", false, CoveredResult::True)]
#[case("d.a > 1 and d.c = 'x'", "d.a, d.b", false, CoveredResult::False)]
#[case("d.a", "d.a", false, CoveredResult::Equiv)]
#[case("1 + 2", "d.a", false, CoveredResult::Skip)]
#[case(
    "any v in d.tags satisfies v = 'x' end",
    "all array t for t in d.tags end",
    false,
    CoveredResult::False
)]
#[case(
    "any v in d.tags satisfies v = 'x' end",
    "all array t for t in d.tags end",
    true,
    CoveredResult::True
)]
fn test_covered_text(
    #[case] source: &str,
    #[case] keys: &str,
    #[case] array: bool,
    #[case] expected: CoveredResult,
) {
    assert_eq!(covered(source, "d", keys, array).unwrap(), expected);
}
