//! Quantifiers, comprehensions and membership
//!
//! All comprehensions share one binding routine: every binding expression
//! is evaluated first (MISSING wins over NULL, a scalar makes the result
//! NULL), then iteration runs for the length of the shortest collection.
//! One pooled buffer holds the per-iteration variables and is returned to
//! the pool on every exit path.

use crate::binding::Bindings;
use crate::context::Context;
use crate::error::EvalResult;
use crate::expression::{CollMap, CollPred, ExprKind, Expression, InList, ObjectMap};
use crate::inlist::HashTable;
use docql_value::{Object, Scope, Value};
use log::debug;
use std::sync::Arc;

/// Bound values for one binding: `(value, key or index)`
type BoundItems = Vec<(Value, Value)>;

enum Bound {
    Missing,
    Null,
    Items(Vec<BoundItems>),
}

/// Descendants of `value` paired with their key within the parent
fn descend_into(value: Value, out: &mut BoundItems) {
    match value {
        Value::Array(items) => {
            for (i, v) in items.into_iter().enumerate() {
                out.push((v.clone(), Value::int(i as i64)));
                descend_into(v, out);
            }
        }
        Value::Object(fields) => {
            let mut fields: Vec<(String, Value)> = fields.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, v) in fields {
                out.push((v.clone(), Value::string(name)));
                descend_into(v, out);
            }
        }
        _ => {}
    }
}

fn bind(bindings: &Bindings, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Bound> {
    let mut missing = false;
    let mut null = false;
    let mut lists = Vec::with_capacity(bindings.len());

    for binding in bindings.iter() {
        let v = binding.expr.evaluate(item, ctx)?;
        let mut items = BoundItems::new();
        match v {
            Value::Missing => missing = true,
            v @ (Value::Array(_) | Value::Object(_)) if binding.descend => descend_into(v, &mut items),
            Value::Array(values) => {
                items.extend(
                    values
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (v, Value::int(i as i64))),
                );
            }
            Value::Object(fields) => {
                let mut fields: Vec<(String, Value)> = fields.into_iter().collect();
                fields.sort_by(|a, b| a.0.cmp(&b.0));
                items.extend(fields.into_iter().map(|(n, v)| (v, Value::string(n))));
            }
            _ => null = true,
        }
        lists.push(items);
    }

    Ok(if missing {
        Bound::Missing
    } else if null {
        Bound::Null
    } else {
        Bound::Items(lists)
    })
}

/// What an iteration body tells the driver
enum Step {
    Next,
    Stop(Value),
}

/// Bind, then run `body` once per iteration in a child scope
///
/// Returns `Ok(Err(unknown))` when the bindings were MISSING or NULL, and
/// `Ok(Ok(Some(v)))` when the body stopped early with `v`.
fn iterate<F>(
    bindings: &Bindings,
    item: &Scope<'_>,
    ctx: &dyn Context,
    mut body: F,
) -> EvalResult<Result<Option<Value>, Value>>
where
    F: FnMut(&Scope<'_>) -> EvalResult<Step>,
{
    let mut lists = match bind(bindings, item, ctx)? {
        Bound::Missing => return Ok(Err(Value::Missing)),
        Bound::Null => return Ok(Err(Value::Null)),
        Bound::Items(lists) => lists,
    };

    let n = lists.iter().map(Vec::len).min().unwrap_or(0);
    let names: Vec<(Arc<str>, Option<Arc<str>>)> = bindings
        .iter()
        .map(|b| (Arc::from(b.variable.as_str()), b.name_variable.as_deref().map(Arc::from)))
        .collect();

    let mut buffer = ctx.pools().bindings.get();
    for i in 0..n {
        buffer.clear();
        for ((variable, name), list) in names.iter().zip(lists.iter_mut()) {
            let (value, key) = std::mem::take(&mut list[i]);
            buffer.push((Arc::clone(variable), value));
            if let Some(name) = name {
                buffer.push((Arc::clone(name), key));
            }
        }
        let scope = item.child(&buffer);
        if let Step::Stop(v) = body(&scope)? {
            return Ok(Ok(Some(v)));
        }
    }
    Ok(Ok(None))
}

fn when_passes(when: Option<&Expression>, scope: &Scope<'_>, ctx: &dyn Context) -> EvalResult<bool> {
    match when {
        Some(w) => Ok(w.evaluate(scope, ctx)?.truth()),
        None => Ok(true),
    }
}

/// `ANY v IN xs SATISFIES p END`
pub(super) fn any(pred: &CollPred, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let rv = iterate(&pred.bindings, item, ctx, |scope| {
        Ok(if pred.satisfies.evaluate(scope, ctx)?.truth() {
            Step::Stop(Value::TRUE)
        } else {
            Step::Next
        })
    })?;
    Ok(match rv {
        Err(unknown) => unknown,
        Ok(found) => found.unwrap_or(Value::FALSE),
    })
}

/// `EVERY v IN xs SATISFIES p END`; TRUE for an empty collection
pub(super) fn every(pred: &CollPred, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let rv = iterate(&pred.bindings, item, ctx, |scope| {
        Ok(if pred.satisfies.evaluate(scope, ctx)?.truth() {
            Step::Next
        } else {
            Step::Stop(Value::FALSE)
        })
    })?;
    Ok(match rv {
        Err(unknown) => unknown,
        Ok(failed) => failed.unwrap_or(Value::TRUE),
    })
}

/// `ANY AND EVERY`; FALSE for an empty collection
pub(super) fn any_every(pred: &CollPred, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let mut seen = false;
    let rv = iterate(&pred.bindings, item, ctx, |scope| {
        seen = true;
        Ok(if pred.satisfies.evaluate(scope, ctx)?.truth() {
            Step::Next
        } else {
            Step::Stop(Value::FALSE)
        })
    })?;
    Ok(match rv {
        Err(unknown) => unknown,
        Ok(Some(failed)) => failed,
        Ok(None) => Value::Boolean(seen),
    })
}

/// Identity mapping over a single plain binding: `ARRAY v FOR v IN xs END`
fn identity_source(map: &CollMap) -> Option<&Expression> {
    let [binding] = &map.bindings[..] else {
        return None;
    };
    let is_identity = matches!(map.mapping.kind(), ExprKind::Identifier(name) if *name == binding.variable)
        && !map.mapping.is_case_insensitive();
    (is_identity && map.when.is_none() && !binding.descend && binding.name_variable.is_none())
        .then_some(&binding.expr)
}

/// `ARRAY m FOR v IN xs [WHEN c] END`; MISSING mappings are skipped
pub(super) fn array(map: &CollMap, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    if let Some(source) = identity_source(map) {
        let v = source.evaluate(item, ctx)?;
        if matches!(v, Value::Array(_) | Value::Missing) {
            return Ok(v);
        }
        if !matches!(v, Value::Object(_)) {
            return Ok(Value::Null);
        }
    }

    let mut out = Vec::new();
    let rv = iterate(&map.bindings, item, ctx, |scope| {
        if when_passes(map.when.as_ref(), scope, ctx)? {
            let v = map.mapping.evaluate(scope, ctx)?;
            if !v.is_missing() {
                out.push(v);
            }
        }
        Ok(Step::Next)
    })?;
    Ok(match rv {
        Err(unknown) => unknown,
        Ok(_) => Value::Array(out),
    })
}

/// `FIRST m FOR v IN xs [WHEN c] END`; MISSING when nothing qualifies
pub(super) fn first(map: &CollMap, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let rv = iterate(&map.bindings, item, ctx, |scope| {
        if when_passes(map.when.as_ref(), scope, ctx)? {
            let v = map.mapping.evaluate(scope, ctx)?;
            if !v.is_missing() {
                return Ok(Step::Stop(v));
            }
        }
        Ok(Step::Next)
    })?;
    Ok(match rv {
        Err(unknown) => unknown,
        Ok(found) => found.unwrap_or(Value::Missing),
    })
}

/// `OBJECT n : v FOR ... END`; non-string names and MISSING values are skipped
pub(super) fn object(map: &ObjectMap, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let mut out = Object::new();
    let rv = iterate(&map.bindings, item, ctx, |scope| {
        if when_passes(map.when.as_ref(), scope, ctx)? {
            if let Value::String(name) = map.name.evaluate(scope, ctx)? {
                let v = map.value.evaluate(scope, ctx)?;
                if !v.is_missing() {
                    out.insert(name, v);
                }
            }
        }
        Ok(Step::Next)
    })?;
    Ok(match rv {
        Err(unknown) => unknown,
        Ok(_) => Value::Object(out),
    })
}

/// Membership by linear scan with the hash table's unknown handling
pub(crate) fn scan_members(needle: &Value, items: &[Value]) -> Value {
    let mut null = false;
    let mut missing = false;
    for candidate in items {
        match candidate {
            Value::Missing => missing = true,
            Value::Null => null = true,
            other => {
                if needle.equals(other).truth() {
                    return Value::TRUE;
                }
            }
        }
    }
    if null {
        Value::Null
    } else if missing {
        Value::Missing
    } else {
        Value::FALSE
    }
}

/// `a IN xs`
pub(super) fn in_list(list: &InList, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let needle = list.first.evaluate(item, ctx)?;
    let haystack = list.second.evaluate(item, ctx)?;
    if needle.is_missing() || haystack.is_missing() {
        return Ok(Value::Missing);
    }
    let Some(items) = haystack.as_array() else {
        return Ok(Value::Null);
    };
    if needle.is_null() {
        return Ok(Value::Null);
    }

    let threshold = ctx.config().inlist_hash_threshold;
    let hashable = list.second.is_static() || list.second.is_uncorrelated_subquery();
    if hashable && items.len() >= threshold {
        let hash = ctx.inlist_hashes().acquire(list.id());
        let table = hash.get_or_build(|| {
            let table = HashTable::build(items);
            debug!(
                "built IN list hash for node {:?}: {} keys, null={}, missing={}",
                list.id(),
                table.len(),
                table.has_null(),
                table.has_missing()
            );
            Ok(Some(table))
        })?;
        if let Some(table) = table {
            return Ok(table.probe(&needle));
        }
    }

    Ok(scan_members(&needle, items))
}

/// `a WITHIN xs`: membership among all descendants
pub(super) fn within(a: &Expression, b: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    let needle = a.evaluate(item, ctx)?;
    let haystack = b.evaluate(item, ctx)?;
    if needle.is_missing() || haystack.is_missing() {
        return Ok(Value::Missing);
    }
    if !matches!(haystack, Value::Array(_) | Value::Object(_)) {
        return Ok(Value::Null);
    }
    if needle.is_null() {
        return Ok(Value::Null);
    }

    let mut descendants = ctx.pools().values.get();
    haystack.descendants(&mut descendants);
    Ok(scan_members(&needle, &descendants))
}

/// `EXISTS xs`
pub(super) fn exists(a: &Expression, item: &Scope<'_>, ctx: &dyn Context) -> EvalResult<Value> {
    Ok(match a.evaluate(item, ctx)? {
        Value::Array(items) => Value::Boolean(!items.is_empty()),
        Value::Missing => Value::Missing,
        _ => Value::Null,
    })
}
