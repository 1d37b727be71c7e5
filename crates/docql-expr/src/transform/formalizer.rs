//! Keyspace qualification of bare identifiers

use super::{Mapper, bound_names, map_children_scoped};
use crate::error::{EvalError, EvalResult};
use crate::expression::{ExprKind, Expression};

/// Rewrites `x` to `` `ks`.`x` `` for a keyspace alias `ks`
///
/// Binding variables, allowed aliases and the keyspace itself are left
/// untouched. `SELF` becomes the keyspace identifier. Without a keyspace
/// every unqualified reference is ambiguous.
#[derive(Debug, Clone, Default)]
pub struct Formalizer {
    keyspace: String,
    allowed: Vec<String>,
}

impl Formalizer {
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            allowed: Vec::new(),
        }
    }

    /// Treat `alias` as already qualified (a LET or WITH variable)
    pub fn with_allowed(mut self, alias: impl Into<String>) -> Self {
        self.allowed.push(alias.into());
        self
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn formalize(&mut self, expr: Expression) -> EvalResult<Expression> {
        let mut rv = self.map(expr)?;
        rv.reset_value();
        Ok(rv)
    }

    fn is_allowed(&self, name: &str) -> bool {
        name == self.keyspace || self.allowed.iter().any(|a| a == name)
    }

    fn keyspace_identifier(&self) -> Expression {
        Expression::identifier(self.keyspace.as_str())
    }
}

impl Mapper for Formalizer {
    fn substitute(&mut self, expr: &Expression) -> EvalResult<Option<Expression>> {
        match expr.kind() {
            ExprKind::Identifier(name) => {
                if expr.is_binding_variable() || self.is_allowed(name) {
                    return Ok(None);
                }
                if self.keyspace.is_empty() {
                    return Err(EvalError::ambiguous_reference(name.as_str()));
                }
                let field = if expr.is_case_insensitive() {
                    Expression::field_ci(self.keyspace_identifier(), name.as_str())
                } else {
                    Expression::field(self.keyspace_identifier(), name.as_str())
                };
                Ok(Some(match expr.span() {
                    Some(span) => field.with_span(span),
                    None => field,
                }))
            }
            ExprKind::SelfRef if !self.keyspace.is_empty() => Ok(Some(self.keyspace_identifier())),
            _ => Ok(None),
        }
    }

    fn map(&mut self, mut expr: Expression) -> EvalResult<Expression> {
        if let Some(sub) = self.substitute(&expr)? {
            return Ok(sub);
        }

        let bound = bound_names(&expr);
        if let Some(dup) = bound.iter().find(|n| self.is_allowed(n)) {
            return Err(EvalError::binding_conflict(format!(
                "duplicate variable {dup} already in scope"
            )));
        }

        map_children_scoped(&mut expr, &mut |child, in_body| {
            let mark = self.allowed.len();
            if in_body {
                self.allowed.extend(bound.iter().cloned());
            }
            let rv = self.map(child);
            self.allowed.truncate(mark);
            rv
        })?;
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::expression::Expression as E;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_qualifies_bare_identifiers() {
        let e = E::and(vec![
            E::equal(E::identifier("a"), E::constant(1)),
            E::any(
                Binding::new("v", E::identifier("tags")).into(),
                E::equal(E::identifier("v"), E::identifier("b")),
            ),
            E::is_not_missing(E::path("d", &["c"])),
            E::is_valued(E::identifier("x")),
        ]);
        let mut formalizer = Formalizer::new("d").with_allowed("x");
        let rv = formalizer.formalize(e).unwrap();
        assert_eq!(
            rv.to_string(),
            "(((`d`.`a`) = 1) and any `v` in (`d`.`tags`) satisfies (`v` = (`d`.`b`)) end \
             and ((`d`.`c`) is not missing) and (`x` is valued))"
        );
    }

    #[test]
    fn test_self_and_case_insensitive() {
        let mut formalizer = Formalizer::new("d");
        assert_eq!(formalizer.formalize(E::self_ref()).unwrap().to_string(), "`d`");
        assert_eq!(
            formalizer.formalize(E::identifier_ci("Name")).unwrap().to_string(),
            "(`d`.`Name`i)"
        );
    }

    #[test]
    fn test_errors() {
        let mut formalizer = Formalizer::new("");
        assert!(matches!(
            formalizer.formalize(E::identifier("a")),
            Err(EvalError::AmbiguousReference { .. })
        ));

        let mut formalizer = Formalizer::new("d");
        let shadowing = E::any(
            Binding::new("d", E::identifier("xs")).into(),
            E::identifier("d"),
        );
        assert!(matches!(
            formalizer.formalize(shadowing),
            Err(EvalError::BindingConflict { .. })
        ));
    }
}
