//! Expression evaluation
//!
//! Three-valued semantics: MISSING and NULL are ordinary results. Errors
//! abort the whole evaluation and are reserved for conditions such as an
//! invalid LIKE pattern or exceeding the nesting limit.

mod arithmetic;
mod collection;
mod comparison;
mod conditional;
mod construction;
mod logical;
mod navigation;

#[cfg(test)]
pub(crate) use collection::scan_members;

use crate::context::Context;
use crate::error::{EvalError, EvalResult};
use crate::expression::{ExprKind, Expression};
use docql_value::{Scope, Value};
use std::cell::Cell;
use std::collections::HashSet;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Tracks evaluation nesting on the current thread
struct DepthGuard;

impl DepthGuard {
    fn enter(limit: usize) -> EvalResult<Self> {
        DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                return Err(EvalError::RecursionLimit { limit });
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

impl Expression {
    /// Evaluate against one item
    pub fn evaluate(&self, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
        let _guard = DepthGuard::enter(ctx.config().max_recursion_depth)?;

        // An already probed constant; never start a probe from here
        if let Some(Some(v)) = self.cached_value() {
            return Ok(v.clone());
        }

        match self.kind() {
            // Arithmetic
            ExprKind::Add(ops) => arithmetic::add(ops, item, ctx),
            ExprKind::Sub(a, b) => arithmetic::sub(a, b, item, ctx),
            ExprKind::Mult(ops) => arithmetic::mult(ops, item, ctx),
            ExprKind::Div(a, b) => arithmetic::div(a, b, item, ctx),
            ExprKind::Mod(a, b) => arithmetic::modulo(a, b, item, ctx),
            ExprKind::Neg(a) => arithmetic::neg(a, item, ctx),
            ExprKind::Concat(ops) => arithmetic::concat(ops, item, ctx),

            // Comparison
            ExprKind::Eq(a, b) => comparison::equal(a, b, item, ctx),
            ExprKind::LT(a, b) => comparison::less_than(a, b, item, ctx),
            ExprKind::LE(a, b) => comparison::less_or_equal(a, b, item, ctx),
            ExprKind::Between(a, low, high) => comparison::between(a, low, high, item, ctx),
            ExprKind::Like(a, pattern) => comparison::like(a, pattern, item, ctx),
            ExprKind::IsMissing(a) => comparison::is_missing(a, item, ctx),
            ExprKind::IsNotMissing(a) => comparison::is_not_missing(a, item, ctx),
            ExprKind::IsNull(a) => comparison::is_null(a, item, ctx),
            ExprKind::IsNotNull(a) => comparison::is_not_null(a, item, ctx),
            ExprKind::IsValued(a) => comparison::is_valued(a, item, ctx),
            ExprKind::IsNotValued(a) => comparison::is_not_valued(a, item, ctx),

            // Logical
            ExprKind::And(ops) => logical::and(ops, item, ctx),
            ExprKind::Or(ops) => logical::or(ops, item, ctx),
            ExprKind::Not(a) => logical::not(a, item, ctx),

            // Collections
            ExprKind::In(list) => collection::in_list(list, item, ctx),
            ExprKind::Within(a, b) => collection::within(a, b, item, ctx),
            ExprKind::Exists(a) => collection::exists(a, item, ctx),
            ExprKind::Any(pred) => collection::any(pred, item, ctx),
            ExprKind::Every(pred) => collection::every(pred, item, ctx),
            ExprKind::AnyEvery(pred) => collection::any_every(pred, item, ctx),
            ExprKind::Array(map) => collection::array(map, item, ctx),
            ExprKind::First(map) => collection::first(map, item, ctx),
            ExprKind::Object(map) => collection::object(map, item, ctx),

            // Conditional
            ExprKind::SearchedCase { whens, else_term } => {
                conditional::searched_case(whens, else_term.as_deref(), item, ctx)
            }
            ExprKind::SimpleCase {
                search,
                whens,
                else_term,
            } => conditional::simple_case(search, whens, else_term.as_deref(), item, ctx),

            // Construction
            ExprKind::ArrayConstruct(ops) => construction::array(ops, item, ctx),
            ExprKind::ObjectConstruct(entries) => construction::object(entries, item, ctx),

            // Navigation
            ExprKind::Element(a, index) => navigation::element(a, index, item, ctx),
            ExprKind::Field(a, name) => navigation::field(a, name, item, ctx),
            ExprKind::FieldName(name) => Ok(Value::string(name.as_str())),
            ExprKind::Slice(a, start, end) => navigation::slice(a, start, end.as_deref(), item, ctx),

            // Leaves
            ExprKind::Identifier(name) => Ok(navigation::identifier(name, self.is_case_insensitive(), item)),
            ExprKind::SelfRef => Ok(item.base().cloned().unwrap_or(Value::Missing)),
            ExprKind::Constant(v) => Ok(v.clone()),
            ExprKind::NamedParameter(name) => Ok(ctx.named_arg(name).cloned().unwrap_or(Value::Missing)),
            ExprKind::PositionalParameter(pos) => {
                Ok(ctx.positional_arg(*pos).cloned().unwrap_or(Value::Missing))
            }

            // Calls and planner nodes
            ExprKind::Function(call) => {
                let mut args = ctx.pools().values.get();
                for op in &call.operands {
                    args.push(op.evaluate(item, ctx)?);
                }
                call.target.invoke(&args, item, ctx)
            }
            ExprKind::Subquery(plan) => ctx.evaluate_subquery(plan.as_ref(), item),
            ExprKind::Cover(cover) => Ok(navigation::covered_value(&cover.text, item)),
            ExprKind::All(all) => all.array.evaluate(item, ctx),
        }
    }

    /// Evaluate an index key
    ///
    /// Array index keys (`ALL`/`DISTINCT`) also return one entry per element;
    /// every other expression yields a single entry.
    pub fn evaluate_for_index(
        &self,
        item: &Scope<'_>,
        ctx: &dyn Context,
    ) -> EvalResult<(Value, Option<Vec<Value>>)> {
        let ExprKind::All(all) = self.kind() else {
            return Ok((self.evaluate(item, ctx)?, None));
        };

        let value = all.array.evaluate(item, ctx)?;
        let Some(items) = value.as_array() else {
            return Ok((value, None));
        };
        let entries = if all.distinct {
            let mut seen = HashSet::with_capacity(items.len());
            items
                .iter()
                .filter(|v| seen.insert(v.marshal()))
                .cloned()
                .collect()
        } else {
            items.to_vec()
        };
        Ok((value, Some(entries)))
    }
}
