//! Read-only pre-order traversal

use crate::error::EvalResult;
use crate::expression::{ExprKind, Expression};

/// What to do after visiting a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Visit the node's children next
    Descend,
    /// Skip the node's children
    Skip,
    /// End the traversal
    Stop,
}

/// Visit `expr` and its descendants in pre-order
///
/// Returns `Ok(false)` if the visitor stopped the traversal early. Errors
/// end the traversal immediately.
pub fn traverse<F>(expr: &Expression, visitor: &mut F) -> EvalResult<bool>
where
    F: FnMut(&Expression) -> EvalResult<Visit>,
{
    match visitor(expr)? {
        Visit::Stop => return Ok(false),
        Visit::Skip => return Ok(true),
        Visit::Descend => {}
    }
    for child in expr.children() {
        if !traverse(child, visitor)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Names of identifiers read by `expr` that are not binding variables,
/// in first-seen order
pub fn identifiers_of(expr: &Expression) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    collect_identifiers(expr, true, &mut Vec::new(), &mut names);
    names
}

/// Names of identifiers not bound inside `expr`, enclosing binding
/// variables included
pub fn free_identifiers(expr: &Expression) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    collect_identifiers(expr, false, &mut Vec::new(), &mut names);
    names
}

fn collect_identifiers(expr: &Expression, skip_flagged: bool, bound: &mut Vec<String>, names: &mut Vec<String>) {
    if let ExprKind::Identifier(name) = expr.kind() {
        let flagged = skip_flagged && expr.is_binding_variable();
        if !flagged && !bound.contains(name) && !names.contains(name) {
            names.push(name.clone());
        }
        return;
    }

    let Some(bindings) = expr.bindings() else {
        for child in expr.children() {
            collect_identifiers(child, skip_flagged, bound, names);
        }
        return;
    };

    let outer = bindings.len();
    let mark = bound.len();
    for (i, child) in expr.children().into_iter().enumerate() {
        if i == outer {
            bound.extend(bindings.variable_names().into_iter().map(str::to_string));
        }
        collect_identifiers(child, skip_flagged, bound, names);
    }
    bound.truncate(mark);
}

/// Whether a subquery appears anywhere in `expr`
pub fn contains_subquery(expr: &Expression) -> bool {
    let mut found = false;
    let _ = traverse(expr, &mut |e| {
        Ok(if matches!(e.kind(), ExprKind::Subquery(_)) {
            found = true;
            Visit::Stop
        } else {
            Visit::Descend
        })
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::context::SubqueryPlan;
    use crate::expression::Expression as E;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Plan;

    impl SubqueryPlan for Plan {
        fn text(&self) -> &str {
            "select 1"
        }

        fn is_correlated(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_identifiers_of() {
        let e = E::and(vec![
            E::path("d", &["a"]),
            E::any(
                Binding::new("v", E::identifier("xs")).into(),
                E::equal(E::identifier("v"), E::identifier("y")),
            ),
            E::identifier("d"),
        ]);
        assert_eq!(identifiers_of(&e), vec!["d", "xs", "y"]);

        let outer_var = E::identifier("w").with_flag(crate::flags::Flags::BINDING_VARIABLE);
        let e = E::any(
            Binding::new("v", E::identifier("xs")).into(),
            E::equal(E::identifier("v"), outer_var),
        );
        assert_eq!(identifiers_of(&e), vec!["xs"]);
        assert_eq!(free_identifiers(&e), vec!["xs", "w"]);
    }

    #[test]
    fn test_traverse_stops() {
        let e = E::add(vec![E::constant(1), E::constant(2), E::constant(3)]);
        let mut seen = 0;
        let finished = traverse(&e, &mut |_| {
            seen += 1;
            Ok(if seen == 2 { Visit::Stop } else { Visit::Descend })
        })
        .unwrap();
        assert!(!finished);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_contains_subquery() {
        let e = E::in_list(E::identifier("a"), E::subquery(Arc::new(Plan)));
        assert!(contains_subquery(&e));
        assert!(!contains_subquery(&E::identifier("a")));
    }
}
