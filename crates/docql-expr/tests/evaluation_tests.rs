//! End-to-end evaluation
//!
//! - Quantifiers over literal, empty and MISSING collections
//! - BETWEEN and DECODE
//! - IN list hashing agreeing with the linear scan
//! - Per-context IN table lifetime

use docql_expr::{Binding, Context, EngineConfig, ExecutionContext, Expression as E};
use docql_value::{Scope, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use serde_json::json;

fn int(i: i64) -> E {
    E::constant(i)
}

fn eval(e: &E) -> Value {
    e.evaluate(&Scope::empty(), &ExecutionContext::new()).unwrap()
}

fn eval_on(e: &E, doc: serde_json::Value) -> Value {
    let doc = Value::from(doc);
    e.evaluate(&Scope::new(&doc), &ExecutionContext::new()).unwrap()
}

fn any_greater_than_two(collection: E) -> E {
    E::any(
        Binding::new("v", collection).into(),
        E::greater_than(E::identifier("v"), int(2)),
    )
}

// ============================================================================
// Scenarios
// ============================================================================

#[rstest]
#[case(E::array_construct(vec![int(1), int(2), int(3)]), Value::TRUE)]
#[case(E::array_construct(vec![]), Value::FALSE)]
#[case(E::missing(), Value::Missing)]
#[case(E::null(), Value::Null)]
#[case(E::constant("abc"), Value::Null)]
fn test_any_over_collections(#[case] collection: E, #[case] expected: Value) {
    assert_eq!(eval(&any_greater_than_two(collection)), expected);
}

#[test]
fn test_between_outside_range() {
    assert_eq!(eval(&E::between(int(1), int(2), int(3))), Value::FALSE);
    assert_eq!(eval(&E::between(int(2), int(2), int(3))), Value::TRUE);
    assert_eq!(eval(&E::between(E::missing(), int(2), E::null())), Value::Missing);
}

#[test]
fn test_decode_picks_matching_arm() {
    let e = E::function(
        "decode",
        vec![int(2), int(1), E::constant("a"), int(2), E::constant("b"), E::constant("z")],
    )
    .unwrap();
    assert_eq!(eval(&e), Value::string("b"));
    assert_eq!(e.value(), Some(&Value::string("b")));
}

#[test]
fn test_every_and_comprehensions_on_document() {
    let doc = json!({"items": [{"n": 1, "k": "a"}, {"n": 5, "k": "b"}, {"k": "c"}]});

    let every = E::every(
        Binding::new("i", E::identifier("items")).into(),
        E::is_valued(E::field(E::identifier("i"), "k")),
    );
    assert_eq!(eval_on(&every, doc.clone()), Value::TRUE);

    let array = E::array(
        E::field(E::identifier("i"), "n"),
        Binding::new("i", E::identifier("items")).into(),
        Some(E::is_not_missing(E::field(E::identifier("i"), "n"))),
    );
    assert_eq!(eval_on(&array, doc.clone()), Value::from(json!([1, 5])));

    let object = E::object(
        E::field(E::identifier("i"), "k"),
        E::field(E::identifier("i"), "n"),
        Binding::new("i", E::identifier("items")).into(),
        None,
    );
    assert_eq!(eval_on(&object, doc), Value::from(json!({"a": 1, "b": 5})));
}

#[test]
fn test_missing_and_null_propagation() {
    let doc = json!({"a": null});
    let add = E::add(vec![E::identifier("a"), int(1)]);
    assert_eq!(eval_on(&add, doc.clone()), Value::Null);

    let add = E::add(vec![E::identifier("nope"), E::identifier("a")]);
    assert_eq!(eval_on(&add, doc.clone()), Value::Missing);

    let and = E::and(vec![E::identifier("a"), E::boolean(false)]);
    assert_eq!(eval_on(&and, doc), Value::FALSE);
}

// ============================================================================
// IN hashing
// ============================================================================

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(Value::Missing),
        any::<bool>().prop_map(Value::Boolean),
        (-20i64..20).prop_map(Value::int),
        (-20i32..20).prop_map(|i| Value::float(f64::from(i) / 2.0)),
        "[a-d]{0,2}".prop_map(Value::string),
    ]
}

/// Numbers around the point where f64 stops holding every integer
fn edge_number() -> impl Strategy<Value = Value> {
    const LIMIT: i64 = 9_007_199_254_740_992;
    prop_oneof![
        (-3i64..4).prop_map(|d| Value::int(LIMIT + d)),
        (-3i64..4).prop_map(|d| Value::float((LIMIT + d) as f64)),
        Just(Value::float(f64::INFINITY)),
        Just(Value::float(f64::NAN)),
        Just(Value::int(i64::MAX)),
    ]
}

fn member() -> impl Strategy<Value = Value> {
    prop_oneof![
        3 => scalar(),
        1 => edge_number(),
        1 => prop::collection::vec(edge_number(), 1..3).prop_map(Value::Array),
    ]
}

fn context(threshold: usize) -> ExecutionContext {
    ExecutionContext::builder()
        .with_config(EngineConfig {
            inlist_hash_threshold: threshold,
            ..EngineConfig::default()
        })
        .build()
}

proptest! {
    #[test]
    fn prop_in_hash_matches_scan(
        items in prop::collection::vec(member(), 1..24),
        needle in member().prop_filter("known needle", |v| !v.is_missing()),
    ) {
        let list = E::array_construct(items.into_iter().map(E::constant).collect());
        let e = E::in_list(E::identifier("x"), list);
        let doc = Value::object([("x", needle)]);
        let scope = Scope::new(&doc);

        let hashed = e.evaluate(&scope, &context(1)).unwrap();
        let scanned = e.evaluate(&scope, &context(usize::MAX)).unwrap();
        prop_assert_eq!(hashed, scanned);
    }
}

#[test]
fn test_in_hash_large_integers() {
    let mut items: Vec<E> = (0..20).map(int).collect();
    items.push(E::constant(9_007_199_254_740_992.0));
    let e = E::in_list(E::identifier("x"), E::array_construct(items));
    let doc = Value::object([("x", Value::int(9_007_199_254_740_993))]);
    let scope = Scope::new(&doc);

    assert_eq!(e.evaluate(&scope, &context(1)).unwrap(), Value::TRUE);
    assert_eq!(e.evaluate(&scope, &context(usize::MAX)).unwrap(), Value::TRUE);
}

#[test]
fn test_in_tables_are_per_context() {
    let list = E::array_construct((0..20).map(int).collect());
    let e = E::in_list(E::identifier("x"), list);
    let doc = Value::object([("x", Value::int(7))]);
    let scope = Scope::new(&doc);

    let first = ExecutionContext::new();
    let second = ExecutionContext::new();
    assert_eq!(e.evaluate(&scope, &first).unwrap(), Value::TRUE);
    assert_eq!(e.evaluate(&scope, &first).unwrap(), Value::TRUE);
    assert_eq!(first.inlist_hashes().len(), 1);
    assert!(second.inlist_hashes().is_empty());

    let copy = e.copy();
    assert_eq!(copy.evaluate(&scope, &first).unwrap(), Value::TRUE);
    assert_eq!(first.inlist_hashes().len(), 2);
}

#[test]
fn test_dynamic_list_is_not_hashed() {
    let e = E::in_list(int(3), E::identifier("xs"));
    let ctx = context(1);
    let doc = Value::from(json!({"xs": [1, 2, 3]}));
    assert_eq!(e.evaluate(&Scope::new(&doc), &ctx).unwrap(), Value::TRUE);
    assert!(ctx.inlist_hashes().is_empty());
}
