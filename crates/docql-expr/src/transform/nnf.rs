//! Negation normal form
//!
//! NOT is pushed down until it only wraps atoms. IN over a short literal
//! list becomes an OR of equalities and BETWEEN becomes two comparisons.

use super::Mapper;
use crate::error::EvalResult;
use crate::expression::{ExprKind, Expression};
use crate::flags::Flags;
use docql_value::Value;

/// Longest literal IN list expanded into equalities
const DEFAULT_IN_EXPANSION: usize = 16;

#[derive(Debug, Clone)]
pub struct Nnf {
    in_expansion: usize,
}

impl Default for Nnf {
    fn default() -> Self {
        Self {
            in_expansion: DEFAULT_IN_EXPANSION,
        }
    }
}

impl Nnf {
    pub fn new() -> Self {
        Self::default()
    }

    /// IN lists shorter than `limit` are expanded
    pub fn with_in_expansion(mut self, limit: usize) -> Self {
        self.in_expansion = limit;
        self
    }

    fn negate(&mut self, operand: Expression) -> EvalResult<Expression> {
        if !pushes_negation(&operand) {
            let mapped = self.map(operand)?;
            return if pushes_negation(&mapped) {
                self.negate(mapped)
            } else {
                Ok(Expression::not(mapped))
            };
        }

        let span = operand.span();
        let negated = match operand.into_kind() {
            ExprKind::Not(inner) => return self.map(*inner),
            ExprKind::And(ops) => Expression::or(ops.into_iter().map(Expression::not).collect()),
            ExprKind::Or(ops) => Expression::and(ops.into_iter().map(Expression::not).collect()),
            ExprKind::LT(a, b) => Expression::new(ExprKind::LE(b, a)),
            ExprKind::LE(a, b) => Expression::new(ExprKind::LT(b, a)),
            ExprKind::IsMissing(a) => Expression::new(ExprKind::IsNotMissing(a)),
            ExprKind::IsNotMissing(a) => Expression::new(ExprKind::IsMissing(a)),
            ExprKind::IsNull(a) => Expression::new(ExprKind::IsNotNull(a)),
            ExprKind::IsNotNull(a) => Expression::new(ExprKind::IsNull(a)),
            ExprKind::IsValued(a) => Expression::new(ExprKind::IsNotValued(a)),
            ExprKind::IsNotValued(a) => Expression::new(ExprKind::IsValued(a)),
            kind => Expression::not(Expression::new(kind)),
        };
        let negated = self.map(negated)?;
        Ok(match span {
            Some(span) => negated.with_span(span),
            None => negated,
        })
    }

    /// Literal right-hand side of IN, if short enough to expand
    fn literal_list(&self, list: &Expression) -> Option<Vec<Expression>> {
        let items: Vec<Expression> = match list.kind() {
            ExprKind::ArrayConstruct(items) => items.iter().map(Expression::copy).collect(),
            ExprKind::Constant(Value::Array(items)) => items.iter().cloned().map(Expression::constant).collect(),
            _ => return None,
        };
        (!items.is_empty() && items.len() < self.in_expansion).then_some(items)
    }
}

impl Mapper for Nnf {
    fn substitute(&mut self, expr: &Expression) -> EvalResult<Option<Expression>> {
        match expr.kind() {
            // `a != b` stays as written
            ExprKind::Not(inner)
                if expr.flags().contains(Flags::NOT_EQUAL) && matches!(inner.kind(), ExprKind::Eq(..)) =>
            {
                Ok(None)
            }
            ExprKind::Not(inner) => self.negate(inner.copy()).map(Some),
            ExprKind::In(list) => {
                let Some(items) = self.literal_list(&list.second) else {
                    return Ok(None);
                };
                let first = self.map((*list.first).copy())?;
                let equalities = items
                    .into_iter()
                    .map(|item| Expression::equal(first.copy(), item))
                    .collect();
                Ok(Some(Expression::or(equalities)))
            }
            ExprKind::Between(a, low, high) => {
                let a = self.map((**a).copy())?;
                let low = self.map((**low).copy())?;
                let high = self.map((**high).copy())?;
                Ok(Some(Expression::and(vec![
                    Expression::greater_or_equal(a.copy(), low),
                    Expression::less_or_equal(a, high),
                ])))
            }
            _ => Ok(None),
        }
    }
}

/// NOT can be pushed through these
fn pushes_negation(expr: &Expression) -> bool {
    matches!(
        expr.kind(),
        ExprKind::Not(_)
            | ExprKind::And(_)
            | ExprKind::Or(_)
            | ExprKind::LT(..)
            | ExprKind::LE(..)
            | ExprKind::IsMissing(_)
            | ExprKind::IsNotMissing(_)
            | ExprKind::IsNull(_)
            | ExprKind::IsNotNull(_)
            | ExprKind::IsValued(_)
            | ExprKind::IsNotValued(_)
    )
}

/// Rewrite into negation normal form with default settings
pub fn normalize(expr: Expression) -> EvalResult<Expression> {
    let mut rv = Nnf::new().map(expr)?;
    rv.reset_value();
    Ok(rv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression as E;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn id(name: &str) -> E {
        E::identifier(name)
    }

    #[rstest]
    #[case(E::not(E::not(id("a"))), "`a`")]
    #[case(E::not(E::and(vec![id("a"), id("b")])), "((not `a`) or (not `b`))")]
    #[case(E::not(E::or(vec![id("a"), E::not(id("b"))])), "((not `a`) and `b`)")]
    #[case(E::not(E::less_than(id("a"), id("b"))), "(`b` <= `a`)")]
    #[case(E::not(E::is_null(id("a"))), "(`a` is not null)")]
    #[case(E::not(E::equal(id("a"), id("b"))), "(not (`a` = `b`))")]
    #[case(E::not(E::not_equal(id("a"), id("b"))), "(`a` = `b`)")]
    #[case(E::not_equal(id("a"), id("b")), "(`a` != `b`)")]
    #[case(
        E::in_list(id("a"), E::array_construct(vec![E::constant(1), E::constant(2)])),
        "((`a` = 1) or (`a` = 2))"
    )]
    #[case(E::in_list(id("a"), id("xs")), "(`a` in `xs`)")]
    #[case(
        E::between(id("a"), E::constant(1), E::constant(5)),
        "((1 <= `a`) and (`a` <= 5))"
    )]
    #[case(
        E::not(E::between(id("a"), E::constant(1), E::constant(5))),
        "((`a` < 1) or (5 < `a`))"
    )]
    fn test_normalize(#[case] input: E, #[case] expected: &str) {
        assert_eq!(normalize(input).unwrap().to_string(), expected);
    }

    #[test]
    fn test_long_literal_in_kept() {
        let items = (0..20).map(E::constant).collect();
        let e = E::in_list(id("a"), E::array_construct(items));
        let rv = normalize(e).unwrap();
        assert!(matches!(rv.kind(), ExprKind::In(_)));
    }

    #[test]
    fn test_semantics_preserved() {
        use crate::context::ExecutionContext;
        use docql_value::Scope;
        use serde_json::json;

        let e = E::not(E::or(vec![
            E::less_than(E::identifier("a"), E::constant(3)),
            E::in_list(E::identifier("b"), E::array_construct(vec![E::constant("x"), E::null()])),
        ]));
        let normal = normalize(e.copy()).unwrap();
        let ctx = ExecutionContext::new();
        for doc in [json!({"a": 5, "b": "y"}), json!({"a": 1}), json!({"a": 4, "b": "x"}), json!({})] {
            let doc = Value::from(doc);
            let scope = Scope::new(&doc);
            assert_eq!(
                e.evaluate(&scope, &ctx).unwrap().truth(),
                normal.evaluate(&scope, &ctx).unwrap().truth(),
                "{doc:?}"
            );
        }
    }
}
