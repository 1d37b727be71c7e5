//! Static analysis properties
//!
//! - Equivalence ignores operand order only where the operator commutes
//! - A covered expression evaluates the same from index values alone
//! - Coverage is stable once keys are replaced by covers
//! - Array index keys answer quantifiers from their entries, never
//!   comprehensions

use docql_expr::transform::{Formalizer, normalize, remove_constants, replace};
use docql_expr::{Binding, ExecutionContext, ExprKind, Expression as E, is_array_covered, is_covered};
use docql_value::{Attachments, Scope, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn leaf() -> impl Strategy<Value = E> {
    prop_oneof![
        "[a-e]".prop_map(E::identifier),
        (0i64..5).prop_map(E::constant),
        Just(E::null()),
    ]
}

// ============================================================================
// Equivalence
// ============================================================================

proptest! {
    #[test]
    fn prop_commutative_operands_are_unordered(
        (ops, shuffled) in prop::collection::vec(leaf(), 2..6)
            .prop_flat_map(|ops| (Just(ops.clone()), Just(ops).prop_shuffle())),
    ) {
        let copy = |v: &[E]| v.iter().map(E::copy).collect::<Vec<_>>();

        prop_assert!(E::add(copy(&ops)).equivalent_to(&E::add(copy(&shuffled))));
        prop_assert!(E::mult(copy(&ops)).equivalent_to(&E::mult(copy(&shuffled))));
        prop_assert!(E::and(copy(&ops)).equivalent_to(&E::and(copy(&shuffled))));
        prop_assert!(E::or(copy(&ops)).equivalent_to(&E::or(copy(&shuffled))));
    }

    #[test]
    fn prop_ordered_operators_keep_order(a in "[a-e]", b in "[a-e]") {
        prop_assume!(a != b);
        let forward = E::sub(E::identifier(a.as_str()), E::identifier(b.as_str()));
        let backward = E::sub(E::identifier(b.as_str()), E::identifier(a.as_str()));
        prop_assert!(!forward.equivalent_to(&backward));

        let concat = E::concat(vec![E::identifier(a.as_str()), E::identifier(b.as_str())]);
        let swapped = E::concat(vec![E::identifier(b.as_str()), E::identifier(a.as_str())]);
        prop_assert!(!concat.equivalent_to(&swapped));
    }
}

#[test]
fn test_nested_and_flattens() {
    let a = || E::identifier("a");
    let b = || E::identifier("b");
    let nested = E::and(vec![a(), E::and(vec![b(), a()])]);
    assert!(nested.equivalent_to(&E::and(vec![b(), a()])));
    assert!(!nested.equivalent_to(&E::or(vec![b(), a()])));
}

// ============================================================================
// Coverage
// ============================================================================

fn keys() -> Vec<E> {
    vec![E::path("d", &["a"]), E::path("d", &["b", "c"])]
}

fn covered_leaf() -> impl Strategy<Value = E> {
    prop_oneof![
        Just(E::path("d", &["a"])),
        Just(E::path("d", &["b", "c"])),
        Just(E::path("d", &["a", "z"])),
        Just(E::path("d", &["x"])),
        Just(E::path("other", &["a"])),
        (0i64..4).prop_map(E::constant),
    ]
}

fn covered_expr() -> impl Strategy<Value = E> {
    covered_leaf().prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..3).prop_map(E::add),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| E::equal(a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| E::less_than(a, b)),
            prop::collection::vec(inner.clone(), 2..3).prop_map(E::and),
            inner.clone().prop_map(E::is_missing),
            inner.prop_map(E::not),
        ]
    })
}

fn doc_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Missing),
        Just(Value::Null),
        (0i64..4).prop_map(Value::int),
        (0i64..4).prop_map(|z| Value::object([("z", Value::int(z))])),
    ]
}

fn document() -> impl Strategy<Value = Value> {
    (doc_value(), doc_value(), doc_value()).prop_map(|(a, c, x)| {
        let mut d = Vec::new();
        for (name, v) in [("a", a), ("x", x)] {
            if !v.is_missing() {
                d.push((name, v));
            }
        }
        if !c.is_missing() {
            d.push(("b", Value::object([("c", c)])));
        }
        Value::object([("d", Value::object(d)), ("other", Value::object([("a", Value::int(1))]))])
    })
}

/// Replace every key with a cover and collect the key values of `doc`
fn cover_keys(expr: &E, doc: &Value, ctx: &ExecutionContext) -> (E, Attachments) {
    let pairs: Vec<(E, E)> = keys().into_iter().map(|k| (k.copy(), E::cover(k))).collect();
    let covered = replace(expr.copy(), &pairs).unwrap();

    let scope = Scope::new(doc);
    let entries: Vec<(String, Value)> = keys()
        .iter()
        .map(|k| (k.to_string(), k.evaluate(&scope, ctx).unwrap()))
        .collect();
    let mut attachments = Attachments::new();
    attachments.insert("covers".to_string(), Value::object(entries));
    (covered, attachments)
}

proptest! {
    #[test]
    fn prop_covered_expressions_need_no_document(expr in covered_expr(), doc in document()) {
        if !is_covered(&expr, "d", &keys()) {
            return Ok(());
        }
        let ctx = ExecutionContext::new();
        let expected = expr.evaluate(&Scope::new(&doc), &ctx).unwrap();

        let (covered, attachments) = cover_keys(&expr, &doc, &ctx);
        let only_other = Value::object([("other", Value::object([("a", Value::int(1))]))]);
        let index_scope = Scope::new(&only_other).with_attachments(&attachments);
        let actual = covered.evaluate(&index_scope, &ctx).unwrap();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_coverage_is_stable(expr in covered_expr(), doc in document()) {
        let first = is_covered(&expr, "d", &keys());
        prop_assert_eq!(first, is_covered(&expr, "d", &keys()));
        if first {
            let (covered, _) = cover_keys(&expr, &doc, &ExecutionContext::new());
            prop_assert!(is_covered(&covered, "d", &keys()));
        }
    }
}

fn tag_field(var: &str, field: &str) -> E {
    E::field(E::identifier(var), field)
}

fn tags_binding(var: &str) -> docql_expr::Bindings {
    Binding::new(var, E::path("d", &["tags"])).into()
}

/// `ALL ARRAY t.x FOR t IN d.tags END`
fn tags_key() -> E {
    E::all(E::array(tag_field("t", "x"), tags_binding("t"), None), false)
}

/// `1 < var.y`, the filter of [`filtered_tags_key`]
fn y_above_one(var: &str) -> E {
    E::greater_than(tag_field(var, "y"), E::constant(1))
}

/// `ALL ARRAY t.x FOR t IN d.tags WHEN t.y > 1 END`
fn filtered_tags_key() -> E {
    E::all(E::array(tag_field("t", "x"), tags_binding("t"), Some(y_above_one("t"))), false)
}

fn satisfies_body() -> impl Strategy<Value = E> {
    let leaf = prop_oneof![
        Just(tag_field("v", "x")),
        Just(tag_field("v", "y")),
        Just(E::path("d", &["a"])),
        (0i64..4).prop_map(E::constant),
    ];
    leaf.prop_recursive(2, 8, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| E::equal(a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| E::less_than(a, b)),
            prop::collection::vec(inner, 2..3).prop_map(E::and),
        ]
    })
}

fn tags_document() -> impl Strategy<Value = Value> {
    let tag = (0i64..4, 0i64..4).prop_map(|(x, y)| Value::object([("x", Value::int(x)), ("y", Value::int(y))]));
    (prop::collection::vec(tag, 0..4), 0i64..4).prop_map(|(tags, a)| {
        Value::object([(
            "d",
            Value::object([("tags", Value::Array(tags)), ("a", Value::int(a))]),
        )])
    })
}

proptest! {
    #[test]
    fn prop_array_covered_quantifiers_need_no_document(
        body in satisfies_body(),
        filtered in any::<bool>(),
        doc in tags_document(),
    ) {
        let (key, body) = if filtered {
            (filtered_tags_key(), E::and(vec![body, y_above_one("v")]))
        } else {
            (tags_key(), body)
        };
        let pred = E::any(tags_binding("v"), body.copy());
        if !is_array_covered(&pred, "d", std::slice::from_ref(&key)) {
            return Ok(());
        }
        let ctx = ExecutionContext::new();
        let expected = pred.evaluate(&Scope::new(&doc), &ctx).unwrap();

        // The index holds one entry per element passing WHEN: the key's mapping
        let ExprKind::All(all) = key.kind() else { unreachable!() };
        let entries = all.array.evaluate(&Scope::new(&doc), &ctx).unwrap();
        let pairs = [
            (tag_field("v", "x"), E::identifier("e")),
            (y_above_one("v"), E::boolean(true)),
        ];
        let over_entries = replace(body, &pairs).unwrap();
        let from_index = E::any(Binding::new("e", E::constant(entries)).into(), over_entries);
        let actual = from_index.evaluate(&Scope::empty(), &ctx).unwrap();
        prop_assert_eq!(actual.truth(), expected.truth());
    }

    #[test]
    fn prop_array_key_never_covers_comprehensions(body in satisfies_body()) {
        let key = tags_key();
        let mapped = E::array(body.copy(), tags_binding("v"), None);
        let first = E::first(body, tags_binding("v"), None);
        prop_assert!(!is_array_covered(&mapped, "d", std::slice::from_ref(&key)));
        prop_assert!(!is_array_covered(&first, "d", std::slice::from_ref(&key)));
    }
}

#[test]
fn test_array_key_rejects_uncovered_bodies() {
    let key = tags_key();
    let reads_y = E::any(tags_binding("v"), E::equal(tag_field("v", "y"), E::constant(1)));
    let reads_doc = E::any(tags_binding("v"), E::equal(tag_field("v", "x"), E::path("d", &["a"])));
    let covered = E::any(tags_binding("v"), E::equal(tag_field("v", "x"), E::constant(1)));
    assert!(!is_array_covered(&reads_y, "d", std::slice::from_ref(&key)));
    assert!(!is_array_covered(&reads_doc, "d", std::slice::from_ref(&key)));
    assert!(is_array_covered(&covered, "d", &[key]));
}

#[test]
fn test_formalized_predicate_against_array_key() {
    let predicate = E::any(
        Binding::new("v", E::identifier("tags")).into(),
        E::equal(E::identifier("v"), E::constant("x")),
    );
    let predicate = Formalizer::new("d").formalize(predicate).unwrap();
    let key = E::all(
        E::array(E::identifier("t"), Binding::new("t", E::path("d", &["tags"])).into(), None),
        false,
    );
    assert!(is_array_covered(&predicate, "d", std::slice::from_ref(&key)));
    assert!(!is_covered(&predicate, "d", &[key]));
}

// ============================================================================
// Rewrites
// ============================================================================

#[test]
fn test_normalize_then_fold() {
    let x = || E::path("d", &["x"]);
    let e = E::not(E::and(vec![
        E::boolean(true),
        E::between(x(), E::constant(1), E::constant(5)),
    ]));
    let rv = remove_constants(normalize(e).unwrap()).unwrap();
    assert_eq!(rv.to_string(), "(((`d`.`x`) < 1) or (5 < (`d`.`x`)))");
}
