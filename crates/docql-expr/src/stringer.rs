//! Canonical text form of expressions
//!
//! The rendering is fully parenthesized and lowercase so that it can be
//! parsed back into an equivalent tree, and two equivalent trees built the
//! same way render identically. The text doubles as a structural key, for
//! example in covered-expression maps.

use crate::binding::{Binding, Bindings};
use crate::expression::{CollMap, CollPred, ExprKind, Expression, WhenTerm};
use crate::flags::Flags;
use docql_value::write_string;
use serde::{Serialize, Serializer};
use std::fmt::{self, Display, Write};

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Stringer { out: f }.expr(self)
    }
}

/// JSON form is the canonical text, not a structured tree
impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct Stringer<'a, W: Write> {
    out: &'a mut W,
}

impl<W: Write> Stringer<'_, W> {
    fn expr(&mut self, expr: &Expression) -> fmt::Result {
        match expr.kind() {
            ExprKind::Add(ops) => self.infix(ops, " + "),
            ExprKind::Mult(ops) => self.infix(ops, " * "),
            ExprKind::Concat(ops) => self.infix(ops, " || "),
            ExprKind::And(ops) => self.infix(ops, " and "),
            ExprKind::Or(ops) => self.infix(ops, " or "),
            ExprKind::Sub(a, b) => self.binary(a, " - ", b),
            ExprKind::Div(a, b) => self.binary(a, " / ", b),
            ExprKind::Mod(a, b) => self.binary(a, " % ", b),
            ExprKind::Eq(a, b) => self.binary(a, " = ", b),
            ExprKind::LT(a, b) => self.binary(a, " < ", b),
            ExprKind::LE(a, b) => self.binary(a, " <= ", b),
            ExprKind::Like(a, b) => self.binary(a, " like ", b),
            ExprKind::Within(a, b) => self.binary(a, " within ", b),
            ExprKind::In(list) => self.binary(&list.first, " in ", &list.second),
            ExprKind::Neg(a) => self.prefix("-", a),
            ExprKind::Exists(a) => self.prefix("exists ", a),
            ExprKind::Not(a) => match a.kind() {
                ExprKind::Eq(x, y) if expr.flags().contains(Flags::NOT_EQUAL) => self.binary(x, " != ", y),
                _ => self.prefix("not ", a),
            },
            ExprKind::IsMissing(a) => self.postfix(a, " is missing"),
            ExprKind::IsNotMissing(a) => self.postfix(a, " is not missing"),
            ExprKind::IsNull(a) => self.postfix(a, " is null"),
            ExprKind::IsNotNull(a) => self.postfix(a, " is not null"),
            ExprKind::IsValued(a) => self.postfix(a, " is valued"),
            ExprKind::IsNotValued(a) => self.postfix(a, " is not valued"),
            ExprKind::Between(item, low, high) => {
                self.out.write_char('(')?;
                self.expr(item)?;
                self.out.write_str(" between ")?;
                self.expr(low)?;
                self.out.write_str(" and ")?;
                self.expr(high)?;
                self.out.write_char(')')
            }
            ExprKind::Any(pred) => self.quantifier("any", pred),
            ExprKind::Every(pred) => self.quantifier("every", pred),
            ExprKind::AnyEvery(pred) => self.quantifier("any and every", pred),
            ExprKind::Array(map) => self.comprehension("array", map),
            ExprKind::First(map) => self.comprehension("first", map),
            ExprKind::Object(map) => {
                self.out.write_str("object ")?;
                self.expr(&map.name)?;
                self.out.write_str(" : ")?;
                self.expr(&map.value)?;
                self.out.write_str(" for ")?;
                self.bindings(&map.bindings)?;
                self.when(map.when.as_ref())?;
                self.out.write_str(" end")
            }
            ExprKind::SearchedCase { whens, else_term } => {
                self.out.write_str("case")?;
                self.case_arms(whens, else_term.as_deref())
            }
            ExprKind::SimpleCase {
                search,
                whens,
                else_term,
            } => {
                self.out.write_str("case ")?;
                self.expr(search)?;
                self.case_arms(whens, else_term.as_deref())
            }
            ExprKind::ArrayConstruct(ops) => {
                self.out.write_char('[')?;
                self.list(ops)?;
                self.out.write_char(']')
            }
            ExprKind::ObjectConstruct(entries) => {
                self.out.write_char('{')?;
                for (i, (name, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        self.out.write_str(", ")?;
                    }
                    let mut quoted = String::with_capacity(name.len() + 2);
                    write_string(name, &mut quoted);
                    self.out.write_str(&quoted)?;
                    self.out.write_str(": ")?;
                    self.expr(value)?;
                }
                self.out.write_char('}')
            }
            ExprKind::Field(base, name) => {
                self.out.write_char('(')?;
                self.expr(base)?;
                self.out.write_char('.')?;
                match name.kind() {
                    ExprKind::FieldName(n) => self.identifier(n, name.is_case_insensitive())?,
                    _ => {
                        self.out.write_char('[')?;
                        self.expr(name)?;
                        self.out.write_char(']')?;
                    }
                }
                self.out.write_char(')')
            }
            ExprKind::Element(base, index) => {
                self.out.write_char('(')?;
                self.expr(base)?;
                self.out.write_char('[')?;
                self.expr(index)?;
                self.out.write_str("])")
            }
            ExprKind::Slice(base, start, end) => {
                self.out.write_char('(')?;
                self.expr(base)?;
                self.out.write_char('[')?;
                self.expr(start)?;
                self.out.write_str(" :")?;
                if let Some(end) = end {
                    self.out.write_char(' ')?;
                    self.expr(end)?;
                }
                self.out.write_str("])")
            }
            ExprKind::FieldName(name) | ExprKind::Identifier(name) => {
                self.identifier(name, expr.is_case_insensitive())
            }
            ExprKind::SelfRef => self.out.write_str("self"),
            ExprKind::Constant(value) => self.out.write_str(&value.marshal()),
            ExprKind::NamedParameter(name) => write!(self.out, "${name}"),
            ExprKind::PositionalParameter(pos) => write!(self.out, "${pos}"),
            ExprKind::Function(call) => {
                self.out.write_str(&call.name)?;
                self.out.write_char('(')?;
                self.list(&call.operands)?;
                self.out.write_char(')')
            }
            ExprKind::Subquery(plan) => write!(self.out, "({})", plan.text()),
            ExprKind::Cover(cover) => write!(self.out, "cover ({})", cover.text),
            ExprKind::All(all) => {
                self.out.write_str(if all.distinct { "(distinct " } else { "(all " })?;
                self.expr(&all.array)?;
                self.out.write_char(')')
            }
        }
    }

    fn identifier(&mut self, name: &str, case_insensitive: bool) -> fmt::Result {
        self.out.write_char('`')?;
        for c in name.chars() {
            if c == '`' || c == '\\' {
                self.out.write_char('\\')?;
            }
            self.out.write_char(c)?;
        }
        self.out.write_char('`')?;
        if case_insensitive {
            self.out.write_char('i')?;
        }
        Ok(())
    }

    fn infix(&mut self, ops: &[Expression], op: &str) -> fmt::Result {
        self.out.write_char('(')?;
        for (i, operand) in ops.iter().enumerate() {
            if i > 0 {
                self.out.write_str(op)?;
            }
            self.expr(operand)?;
        }
        self.out.write_char(')')
    }

    fn binary(&mut self, a: &Expression, op: &str, b: &Expression) -> fmt::Result {
        self.out.write_char('(')?;
        self.expr(a)?;
        self.out.write_str(op)?;
        self.expr(b)?;
        self.out.write_char(')')
    }

    fn prefix(&mut self, op: &str, a: &Expression) -> fmt::Result {
        self.out.write_char('(')?;
        self.out.write_str(op)?;
        self.expr(a)?;
        self.out.write_char(')')
    }

    fn postfix(&mut self, a: &Expression, op: &str) -> fmt::Result {
        self.out.write_char('(')?;
        self.expr(a)?;
        self.out.write_str(op)?;
        self.out.write_char(')')
    }

    fn list(&mut self, ops: &[Expression]) -> fmt::Result {
        for (i, operand) in ops.iter().enumerate() {
            if i > 0 {
                self.out.write_str(", ")?;
            }
            self.expr(operand)?;
        }
        Ok(())
    }

    fn binding(&mut self, binding: &Binding) -> fmt::Result {
        if let Some(name) = &binding.name_variable {
            self.identifier(name, false)?;
            self.out.write_str(" : ")?;
        }
        self.identifier(&binding.variable, false)?;
        self.out
            .write_str(if binding.descend { " within " } else { " in " })?;
        self.expr(&binding.expr)
    }

    fn bindings(&mut self, bindings: &Bindings) -> fmt::Result {
        for (i, binding) in bindings.iter().enumerate() {
            if i > 0 {
                self.out.write_str(", ")?;
            }
            self.binding(binding)?;
        }
        Ok(())
    }

    fn when(&mut self, when: Option<&Expression>) -> fmt::Result {
        if let Some(cond) = when {
            self.out.write_str(" when ")?;
            self.expr(cond)?;
        }
        Ok(())
    }

    fn quantifier(&mut self, keyword: &str, pred: &CollPred) -> fmt::Result {
        self.out.write_str(keyword)?;
        self.out.write_char(' ')?;
        self.bindings(&pred.bindings)?;
        self.out.write_str(" satisfies ")?;
        self.expr(&pred.satisfies)?;
        self.out.write_str(" end")
    }

    fn comprehension(&mut self, keyword: &str, map: &CollMap) -> fmt::Result {
        self.out.write_str(keyword)?;
        self.out.write_char(' ')?;
        self.expr(&map.mapping)?;
        self.out.write_str(" for ")?;
        self.bindings(&map.bindings)?;
        self.when(map.when.as_ref())?;
        self.out.write_str(" end")
    }

    fn case_arms(&mut self, whens: &[WhenTerm], else_term: Option<&Expression>) -> fmt::Result {
        for term in whens {
            self.out.write_str(" when ")?;
            self.expr(&term.when)?;
            self.out.write_str(" then ")?;
            self.expr(&term.then)?;
        }
        if let Some(e) = else_term {
            self.out.write_str(" else ")?;
            self.expr(e)?;
        }
        self.out.write_str(" end")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression as E;
    use docql_value::Value;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn int(i: i64) -> E {
        E::constant(i)
    }

    fn id(name: &str) -> E {
        E::identifier(name)
    }

    #[rstest]
    #[case(E::add(vec![int(1), int(2), id("x")]), "(1 + 2 + `x`)")]
    #[case(E::sub(id("a"), int(1)), "(`a` - 1)")]
    #[case(E::concat(vec![E::constant("a"), id("b")]), "(\"a\" || `b`)")]
    #[case(E::neg(id("a")), "(-`a`)")]
    #[case(E::not_equal(id("a"), int(1)), "(`a` != 1)")]
    #[case(E::not(E::equal(id("a"), int(1))), "(not (`a` = 1))")]
    #[case(E::greater_or_equal(id("a"), int(1)), "(1 <= `a`)")]
    #[case(E::between(int(1), int(2), int(3)), "(1 between 2 and 3)")]
    #[case(E::like(id("a"), E::constant("x%")), "(`a` like \"x%\")")]
    #[case(E::is_not_valued(id("a")), "(`a` is not valued)")]
    #[case(E::exists(id("a")), "(exists `a`)")]
    #[case(E::in_list(id("a"), E::array_construct(vec![int(1), int(2)])), "(`a` in [1, 2])")]
    #[case(E::within(int(1), id("a")), "(1 within `a`)")]
    #[case(E::missing(), "missing")]
    #[case(E::constant(Value::float(2.0)), "2")]
    #[case(E::self_ref(), "self")]
    #[case(E::named_parameter("p"), "$p")]
    #[case(E::positional_parameter(2), "$2")]
    #[case(E::identifier_ci("Name"), "`Name`i")]
    #[case(E::identifier("a`b"), "`a\\`b`")]
    #[case(E::element(id("a"), int(0)), "(`a`[0])")]
    #[case(E::slice(id("a"), int(1), None), "(`a`[1 :])")]
    #[case(E::slice(id("a"), int(1), Some(int(3))), "(`a`[1 : 3])")]
    #[case(E::field_expr(id("a"), E::constant("b")), "(`a`.[\"b\"])")]
    #[case(E::function("lower", vec![id("a")]).unwrap(), "lower(`a`)")]
    fn test_render(#[case] e: E, #[case] expected: &str) {
        assert_eq!(e.to_string(), expected);
    }

    #[test]
    fn test_render_collections() {
        let b = Binding::with_name("i", "v", id("xs"));
        let e = E::every(Bindings::from_iter([b, Binding::new("w", id("ys")).descending()]), E::boolean(true));
        assert_eq!(e.to_string(), "every `i` : `v` in `xs`, `w` within `ys` satisfies true end");

        let e = E::array(
            E::field(id("v"), "x"),
            Binding::new("v", id("xs")).into(),
            Some(E::is_not_null(id("v"))),
        );
        assert_eq!(e.to_string(), "array (`v`.`x`) for `v` in `xs` when (`v` is not null) end");

        let e = E::object(id("k"), id("v"), Binding::with_name("k", "v", id("o")).into(), None);
        assert_eq!(e.to_string(), "object `k` : `v` for `k` : `v` in `o` end");

        let e = E::any_every(Binding::new("v", id("xs")).into(), id("v"));
        assert_eq!(e.to_string(), "any and every `v` in `xs` satisfies `v` end");

        let key = E::all(E::array(id("t"), Binding::new("t", id("xs")).into(), None), true);
        assert_eq!(key.to_string(), "(distinct array `t` for `t` in `xs` end)");
    }

    #[test]
    fn test_render_case_and_objects() {
        let e = E::simple_case(
            id("a"),
            vec![WhenTerm {
                when: int(1),
                then: E::constant("one"),
            }],
            Some(E::null()),
        );
        assert_eq!(e.to_string(), "case `a` when 1 then \"one\" else null end");

        let e = E::object_construct(vec![("z".into(), int(1)), ("a\"b".into(), id("x"))]);
        assert_eq!(e.to_string(), "{\"a\\\"b\": `x`, \"z\": 1}");
    }

    #[test]
    fn test_serialize_as_text() {
        let e = E::equal(E::path("d", &["a"]), int(1));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json, serde_json::Value::String("((`d`.`a`) = 1)".to_string()));
    }
}
