//! Tree rewriting
//!
//! Every rewrite goes through [`Mapper`]: a node is offered to
//! [`Mapper::substitute`] first and, when no substitute is returned, its
//! children are mapped in place.

mod any;
mod constants;
mod formalizer;
mod nnf;
mod remover;
mod rename;
mod traverser;

pub use any::{bindings_for, gather_any, has_renameable_bindings};
pub use constants::remove_constants;
pub use formalizer::Formalizer;
pub use nnf::{Nnf, normalize};
pub use remover::remove_expr;
pub use rename::{Inliner, Renamer, Replacer, inline, rename_bindings, rename_variables, replace};
pub use traverser::{Visit, contains_subquery, free_identifiers, identifiers_of, traverse};

use crate::error::EvalResult;
use crate::expression::Expression;

/// Per-node rewrite
pub trait Mapper {
    /// Replacement for `expr`, or `None` to descend into its children
    fn substitute(&mut self, _expr: &Expression) -> EvalResult<Option<Expression>> {
        Ok(None)
    }

    fn map(&mut self, mut expr: Expression) -> EvalResult<Expression> {
        if let Some(sub) = self.substitute(&expr)? {
            return Ok(sub);
        }
        expr.map_children(&mut |child| self.map(child))?;
        Ok(expr)
    }
}

/// Names a quantifier or comprehension brings into scope for its body
pub(crate) fn bound_names(expr: &Expression) -> Vec<String> {
    expr.bindings()
        .map(|b| b.variable_names().into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Map children, telling `mapper` whether each child is inside the node's
/// binding scope
///
/// Binding expressions come first among the children and see the outer
/// scope; bodies see the node's variables.
pub(crate) fn map_children_scoped(
    expr: &mut Expression,
    mapper: &mut dyn FnMut(Expression, bool) -> EvalResult<Expression>,
) -> EvalResult<()> {
    let outer = expr.bindings().map_or(0, |b| b.len());
    let mut index = 0;
    expr.map_children(&mut |child| {
        let in_body = outer > 0 && index >= outer;
        index += 1;
        mapper(child, in_body)
    })
}
