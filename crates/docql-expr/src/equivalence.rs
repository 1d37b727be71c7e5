//! Structural equivalence and dependency tests
//!
//! Used by index selection. Every test here may return false negatives;
//! none may return false positives.

use crate::binding::Bindings;
use crate::expression::{ExprKind, Expression};
use crate::transform::rename_bindings;
use std::collections::HashSet;
use std::sync::Arc;

impl Expression {
    /// Equal constant values, or the same variant with equivalent children
    ///
    /// AND, OR, `+`, `*`, `=` and commutative functions match their
    /// operands without regard to order; AND/OR/`+`/`*` are flattened
    /// first.
    pub fn equivalent_to(&self, other: &Expression) -> bool {
        if value_equivalent(self, other) {
            return true;
        }

        let (a, b) = (uncovered(self), uncovered(other));
        if !std::ptr::eq(a, self) || !std::ptr::eq(b, other) {
            return a.equivalent_to(b);
        }
        if !a.same_kind(b) {
            return false;
        }

        match (a.kind(), b.kind()) {
            (ExprKind::And(_), ExprKind::And(_)) => logical_equivalent(a, b, true),
            (ExprKind::Or(_), ExprKind::Or(_)) => logical_equivalent(a, b, false),
            (ExprKind::Add(_), ExprKind::Add(_)) | (ExprKind::Mult(_), ExprKind::Mult(_)) => {
                unordered_match(&flatten(a), &flatten(b))
            }
            (ExprKind::Eq(a1, a2), ExprKind::Eq(b1, b2)) => {
                (a1.equivalent_to(b1) && a2.equivalent_to(b2))
                    || (a1.equivalent_to(b2) && a2.equivalent_to(b1))
            }
            (ExprKind::Function(x), ExprKind::Function(y)) => {
                if !x.name.eq_ignore_ascii_case(&y.name) {
                    return false;
                }
                if x.target.is_commutative() {
                    let xs: Vec<&Expression> = x.operands.iter().collect();
                    let ys: Vec<&Expression> = y.operands.iter().collect();
                    unordered_match(&xs, &ys)
                } else {
                    equivalents(&x.operands, &y.operands)
                }
            }
            (ExprKind::Identifier(x), ExprKind::Identifier(y))
            | (ExprKind::FieldName(x), ExprKind::FieldName(y)) => {
                if a.is_case_insensitive() != b.is_case_insensitive() {
                    false
                } else if a.is_case_insensitive() {
                    x.eq_ignore_ascii_case(y)
                } else {
                    x == y
                }
            }
            (ExprKind::NamedParameter(x), ExprKind::NamedParameter(y)) => x == y,
            (ExprKind::PositionalParameter(x), ExprKind::PositionalParameter(y)) => x == y,
            (ExprKind::Constant(_), ExprKind::Constant(_)) => false,
            (ExprKind::SelfRef, ExprKind::SelfRef) => true,
            (ExprKind::Subquery(x), ExprKind::Subquery(y)) => Arc::ptr_eq(x, y) || x.text() == y.text(),
            (ExprKind::Any(x), ExprKind::Any(y))
            | (ExprKind::Every(x), ExprKind::Every(y))
            | (ExprKind::AnyEvery(x), ExprKind::AnyEvery(y)) => {
                x.bindings.equivalent_to(&y.bindings) && x.satisfies.equivalent_to(&y.satisfies)
            }
            (ExprKind::Array(x), ExprKind::Array(y)) | (ExprKind::First(x), ExprKind::First(y)) => {
                x.bindings.equivalent_to(&y.bindings)
                    && x.mapping.equivalent_to(&y.mapping)
                    && equivalent(x.when.as_ref(), y.when.as_ref())
            }
            (ExprKind::Object(x), ExprKind::Object(y)) => {
                x.bindings.equivalent_to(&y.bindings)
                    && x.name.equivalent_to(&y.name)
                    && x.value.equivalent_to(&y.value)
                    && equivalent(x.when.as_ref(), y.when.as_ref())
            }
            (ExprKind::ObjectConstruct(x), ExprKind::ObjectConstruct(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .zip(y.iter())
                        .all(|((n1, v1), (n2, v2))| n1 == n2 && v1.equivalent_to(v2))
            }
            (ExprKind::Slice(_, _, x), ExprKind::Slice(_, _, y)) if x.is_some() != y.is_some() => false,
            (ExprKind::SearchedCase { else_term: x, .. }, ExprKind::SearchedCase { else_term: y, .. })
            | (ExprKind::SimpleCase { else_term: x, .. }, ExprKind::SimpleCase { else_term: y, .. })
                if x.is_some() != y.is_some() =>
            {
                false
            }
            (ExprKind::All(x), ExprKind::All(y)) => x.distinct == y.distinct && x.array.equivalent_to(&y.array),
            _ => {
                let (xs, ys) = (a.children(), b.children());
                xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| x.equivalent_to(y))
            }
        }
    }

    /// Whether evaluating this expression reads `other`
    ///
    /// Conditional expressions are opaque and constants are never depended
    /// on. An array index key is compared through the collection it ranges
    /// over.
    pub fn depends_on(&self, other: &Expression) -> bool {
        let other = index_source(other);
        if self.is_conditional() || other.value().is_some() {
            return false;
        }
        self.depends_on_inner(other)
    }

    fn depends_on_inner(&self, other: &Expression) -> bool {
        if self.is_conditional() {
            return false;
        }
        if self.equivalent_to(other) {
            return true;
        }
        self.children().iter().any(|c| c.depends_on_inner(other))
    }
}

/// `ALL ARRAY m FOR v IN src END` ranges over `src`
fn index_source(expr: &Expression) -> &Expression {
    let mut current = expr;
    loop {
        let next = match current.kind() {
            ExprKind::All(all) => &all.array,
            ExprKind::Array(map) if map.bindings.len() == 1 => &map.bindings[0].expr,
            _ => return current,
        };
        current = next;
    }
}

fn uncovered(expr: &Expression) -> &Expression {
    match expr.kind() {
        ExprKind::Cover(cover) => uncovered(&cover.covered),
        _ => expr,
    }
}

fn value_equivalent(a: &Expression, b: &Expression) -> bool {
    match (a.value(), b.value()) {
        (Some(x), Some(y)) => x.equivalent(y),
        _ => false,
    }
}

/// Operands of nested nodes of the same variant, in order
fn flatten(expr: &Expression) -> Vec<&Expression> {
    let mut out = Vec::new();
    flatten_into(expr, expr, &mut out);
    out
}

fn flatten_into<'a>(root: &Expression, expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    for child in expr.children() {
        if child.same_kind(root) && child.value().is_none() {
            flatten_into(root, child, out);
        } else {
            out.push(child);
        }
    }
}

/// Flattened and de-duplicated operands, or the statically decided truth
fn logical_terms(expr: &Expression, conjunction: bool) -> Result<Vec<&Expression>, bool> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    let mut all_decided = true;
    for term in flatten(expr) {
        match term.value() {
            Some(v) if !v.is_unknown() && v.truth() != conjunction => return Err(!conjunction),
            Some(v) if !v.is_unknown() => continue,
            _ => all_decided = false,
        }
        if seen.insert(term.to_string()) {
            terms.push(term);
        }
    }
    if all_decided {
        return Err(conjunction);
    }
    Ok(terms)
}

fn logical_equivalent(a: &Expression, b: &Expression, conjunction: bool) -> bool {
    match (logical_terms(a, conjunction), logical_terms(b, conjunction)) {
        (Err(x), Err(y)) => x == y,
        (Ok(xs), Ok(ys)) => unordered_match(&xs, &ys),
        _ => false,
    }
}

/// Every operand on the left matches a distinct operand on the right
fn unordered_match(xs: &[&Expression], ys: &[&Expression]) -> bool {
    if xs.len() != ys.len() {
        return false;
    }
    let mut used = vec![false; ys.len()];
    xs.iter().all(|x| {
        let hit = ys
            .iter()
            .enumerate()
            .find(|(i, y)| !used[*i] && x.equivalent_to(y))
            .map(|(i, _)| i);
        match hit {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

/// Equivalence over optional expressions; two absent expressions match
pub fn equivalent(a: Option<&Expression>, b: Option<&Expression>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.equivalent_to(y),
        _ => false,
    }
}

/// Pairwise, in order
pub fn equivalents(a: &[Expression], b: &[Expression]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent_to(y))
}

pub fn copy_expressions(exprs: &[Expression]) -> Vec<Expression> {
    exprs.iter().map(Expression::copy).collect()
}

/// Bindings that differ only in variable names
fn loose_bindings(a: &Bindings, b: &Bindings) -> bool {
    a.equivalent_expressions(b)
}

/// ANY/EVERY equivalence allowing different binding variable names
///
/// The right side is renamed to the left side's variables; a renaming
/// that would capture another variable makes the pair non-equivalent.
pub fn equivalent_coll_pred(a: &Expression, b: &Expression) -> bool {
    let (Some(ab), Some(bb)) = (a.bindings(), b.bindings()) else {
        return false;
    };
    let both_preds = matches!(
        (a.kind(), b.kind()),
        (ExprKind::Any(_), ExprKind::Any(_))
            | (ExprKind::Every(_), ExprKind::Every(_))
            | (ExprKind::AnyEvery(_), ExprKind::AnyEvery(_))
    );
    if !both_preds || !loose_bindings(ab, bb) {
        return false;
    }
    match rename_bindings(b, ab) {
        Some((renamed, _)) => a.equivalent_to(&renamed),
        None => false,
    }
}

/// ARRAY/FIRST equivalence allowing different binding variable names
pub fn equivalent_coll_map(a: &Expression, b: &Expression) -> bool {
    let (Some(ab), Some(bb)) = (a.bindings(), b.bindings()) else {
        return false;
    };
    let both_maps = matches!(
        (a.kind(), b.kind()),
        (ExprKind::Array(_), ExprKind::Array(_)) | (ExprKind::First(_), ExprKind::First(_))
    );
    if !both_maps || !loose_bindings(ab, bb) {
        return false;
    }
    match rename_bindings(b, ab) {
        Some((renamed, _)) => a.equivalent_to(&renamed),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::expression::Expression as E;
    use rstest::rstest;

    fn id(name: &str) -> E {
        E::identifier(name)
    }

    #[rstest]
    #[case(E::and(vec![id("a"), id("b")]), E::and(vec![id("b"), id("a")]))]
    #[case(
        E::and(vec![id("a"), E::and(vec![id("b"), id("c")])]),
        E::and(vec![id("a"), id("b"), id("c")])
    )]
    #[case(E::or(vec![id("a"), id("a"), id("b")]), E::or(vec![id("b"), id("a")]))]
    #[case(E::add(vec![id("x"), E::constant(1)]), E::add(vec![E::constant(1), id("x")]))]
    #[case(E::equal(id("x"), E::constant(1)), E::equal(E::constant(1), id("x")))]
    #[case(E::add(vec![E::constant(1), E::constant(2)]), E::constant(3))]
    #[case(E::cover(E::path("d", &["a"])), E::path("d", &["a"]))]
    #[case(E::and(vec![id("a"), E::boolean(false)]), E::and(vec![E::boolean(false), id("b")]))]
    #[case(
        E::function("greatest", vec![id("a"), id("b")]).unwrap(),
        E::function("GREATEST", vec![id("b"), id("a")]).unwrap()
    )]
    fn test_equivalent(#[case] a: E, #[case] b: E) {
        assert!(a.equivalent_to(&b), "{a} vs {b}");
        assert!(b.equivalent_to(&a), "{b} vs {a}");
    }

    #[rstest]
    #[case(E::sub(id("a"), id("b")), E::sub(id("b"), id("a")))]
    #[case(E::and(vec![id("a"), id("b")]), E::or(vec![id("a"), id("b")]))]
    #[case(E::and(vec![id("a"), id("a")]), E::and(vec![id("a"), id("b")]))]
    #[case(id("a"), E::identifier_ci("a"))]
    #[case(E::path("d", &["a"]), E::path("d", &["b"]))]
    #[case(
        E::function("ifmissing", vec![id("a"), id("b")]).unwrap(),
        E::function("ifmissing", vec![id("b"), id("a")]).unwrap()
    )]
    #[case(E::all(id("xs"), true), E::all(id("xs"), false))]
    fn test_not_equivalent(#[case] a: E, #[case] b: E) {
        assert!(!a.equivalent_to(&b), "{a} vs {b}");
    }

    #[test]
    fn test_depends_on() {
        let key = E::path("d", &["a"]);
        let e = E::add(vec![E::path("d", &["a"]), E::constant(1)]);
        assert!(e.depends_on(&key));
        assert!(!e.depends_on(&E::constant(1)));

        let case = E::searched_case(
            vec![crate::expression::WhenTerm {
                when: key.copy(),
                then: E::constant(1),
            }],
            None,
        );
        assert!(!case.depends_on(&key));

        let index_key = E::all(
            E::array(id("v"), Binding::new("v", E::path("d", &["tags"])).into(), None),
            false,
        );
        let pred = E::equal(E::element(E::path("d", &["tags"]), E::constant(0)), E::constant("x"));
        assert!(pred.depends_on(&index_key));
    }

    #[test]
    fn test_loose_coll_pred() {
        let any = |var: &str| {
            E::any(
                Binding::new(var, E::path("d", &["xs"])).into(),
                E::equal(id(var), E::constant(1)),
            )
        };
        assert!(!any("v").equivalent_to(&any("w")));
        assert!(equivalent_coll_pred(&any("v"), &any("w")));

        let other_source = E::any(
            Binding::new("w", E::path("d", &["ys"])).into(),
            E::equal(id("w"), E::constant(1)),
        );
        assert!(!equivalent_coll_pred(&any("v"), &other_source));
    }

    #[test]
    fn test_loose_coll_pred_outer_variable() {
        let xs = || Binding::new("w", id("xs")).into();
        let self_equal = E::any(xs(), E::equal(id("w"), id("w")));
        let reads_outer = E::any(
            Binding::new("v", id("xs")).into(),
            E::equal(id("v"), id("w")),
        );
        assert!(!equivalent_coll_pred(&self_equal, &reads_outer));
        assert!(!self_equal.equivalent_to(&reads_outer));
    }

    #[test]
    fn test_loose_coll_map() {
        let array = |var: &str| E::array(E::field(id(var), "a"), Binding::new(var, id("xs")).into(), None);
        assert!(equivalent_coll_map(&array("v"), &array("u")));
        assert!(!equivalent_coll_map(&array("v"), &E::first(E::field(id("u"), "a"), Binding::new("u", id("xs")).into(), None)));
    }

    #[test]
    fn test_optional_helpers() {
        assert!(equivalent(None, None));
        assert!(!equivalent(Some(&id("a")), None));
        let xs = vec![id("a"), E::constant(1)];
        let copies = copy_expressions(&xs);
        assert!(equivalents(&xs, &copies));
        assert!(!equivalents(&xs, &copies[..1]));
    }
}
