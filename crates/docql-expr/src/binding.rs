//! Variable bindings of quantifiers and comprehensions
//!
//! A binding names the current element (`variable`) of a collection and,
//! optionally, its key or index (`name_variable`). `descend` iterates every
//! descendant instead of direct children (`WITHIN` instead of `IN`).

use crate::expression::Expression;
use crate::flags::Flags;
use log::trace;
use smallvec::SmallVec;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone)]
pub struct Binding {
    pub name_variable: Option<String>,
    pub variable: String,
    pub expr: Expression,
    pub descend: bool,
    /// Bound to a static collection
    pub is_static: bool,
}

impl Binding {
    /// `variable IN expr`
    pub fn new(variable: impl Into<String>, expr: Expression) -> Self {
        Self {
            name_variable: None,
            variable: variable.into(),
            expr,
            descend: false,
            is_static: false,
        }
    }

    /// `name_variable : variable IN expr`
    pub fn with_name(name_variable: impl Into<String>, variable: impl Into<String>, expr: Expression) -> Self {
        Self {
            name_variable: Some(name_variable.into()),
            ..Self::new(variable, expr)
        }
    }

    /// Iterate all descendants (`WITHIN`)
    pub fn descending(mut self) -> Self {
        self.descend = true;
        self
    }

    pub fn static_binding(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Same names, same mode and equivalent expressions
    pub fn equivalent_to(&self, other: &Binding) -> bool {
        self.variable == other.variable
            && self.name_variable == other.name_variable
            && self.descend == other.descend
            && self.expr.equivalent_to(&other.expr)
    }

    /// Covered by `other`: equivalent expression under a mode at least as
    /// permissive
    pub fn subset_of(&self, other: &Binding) -> bool {
        (!self.descend || other.descend)
            && (self.name_variable.is_none() || other.name_variable.is_some())
            && self.expr.equivalent_to(&other.expr)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.variable.as_str()).chain(self.name_variable.as_deref())
    }
}

/// Result of renaming one binding list onto another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingVarOptions {
    /// Every variable already has the target name
    Same,
    /// Renaming would capture another variable
    Conflict,
    /// Variables differ and can be renamed
    Differ,
}

/// Classification plus the `(from, to)` name substitutions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renaming {
    pub options: BindingVarOptions,
    pub mapping: Vec<(String, String)>,
}

impl Renaming {
    fn conflict() -> Self {
        Self {
            options: BindingVarOptions::Conflict,
            mapping: Vec::new(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.options == BindingVarOptions::Conflict
    }

    /// Names introduced by the renaming
    pub fn new_names(&self) -> impl Iterator<Item = &str> {
        self.mapping.iter().map(|(_, to)| to.as_str())
    }
}

/// Ordered binding list
#[derive(Debug, Clone, Default)]
pub struct Bindings(SmallVec<[Binding; 1]>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, binding: Binding) {
        self.0.push(binding);
    }

    /// Positional strict equivalence
    pub fn equivalent_to(&self, other: &Bindings) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a.equivalent_to(b))
    }

    /// Positional equivalence ignoring variable names
    pub fn equivalent_expressions(&self, other: &Bindings) -> bool {
        self.len() == other.len()
            && self.iter().zip(other.iter()).all(|(a, b)| {
                a.descend == b.descend
                    && a.name_variable.is_some() == b.name_variable.is_some()
                    && a.expr.equivalent_to(&b.expr)
            })
    }

    /// Every binding here is covered by some binding of `other`
    pub fn subset_of(&self, other: &Bindings) -> bool {
        self.iter().all(|b| other.iter().any(|o| b.subset_of(o)))
    }

    /// Classify renaming these variables to the positional names in `to`
    pub fn rename_variables(&self, to: &Bindings) -> Renaming {
        if self.len() != to.len() {
            return Renaming::conflict();
        }

        let mut mapping = Vec::new();
        for (pos, (from, target)) in self.iter().zip(to.iter()).enumerate() {
            let pairs = [
                (Some(from.variable.as_str()), Some(target.variable.as_str()), false),
                (from.name_variable.as_deref(), target.name_variable.as_deref(), true),
            ];
            for (old, new, is_name) in pairs {
                let (Some(old), Some(new)) = (old, new) else {
                    continue;
                };
                if old == new {
                    continue;
                }
                if self.captures(new, pos, is_name) {
                    trace!("renaming `{old}` to `{new}` captures another binding variable");
                    return Renaming::conflict();
                }
                mapping.push((old.to_string(), new.to_string()));
            }
        }

        Renaming {
            options: if mapping.is_empty() {
                BindingVarOptions::Same
            } else {
                BindingVarOptions::Differ
            },
            mapping,
        }
    }

    /// `name` is already used by a different slot
    fn captures(&self, name: &str, pos: usize, is_name: bool) -> bool {
        self.iter().enumerate().any(|(i, b)| {
            (b.variable == name && (i != pos || is_name))
                || (b.name_variable.as_deref() == Some(name) && (i != pos || !is_name))
        })
    }

    /// Any variable here appears in `names`
    pub fn duplicate_variable<'a>(&self, mut names: impl Iterator<Item = &'a str>) -> bool {
        names.any(|n| self.iter().any(|b| b.names().any(|m| m == n)))
    }

    /// Identifier nodes for every variable, flagged as binding variables
    pub fn identifiers(&self) -> Vec<Expression> {
        let mut out = Vec::with_capacity(self.len() * 2);
        for b in self.iter() {
            for name in b.names() {
                let mut id = Expression::identifier(name).with_flag(Flags::BINDING_VARIABLE);
                if b.is_static {
                    id.set_flag(Flags::STATIC_VARIABLE, true);
                }
                out.push(id);
            }
        }
        out
    }

    /// Every variable name, in declaration order
    pub fn variable_names(&self) -> Vec<&str> {
        self.iter().flat_map(|b| b.names()).collect()
    }
}

impl Deref for Bindings {
    type Target = [Binding];

    fn deref(&self) -> &[Binding] {
        &self.0
    }
}

impl DerefMut for Bindings {
    fn deref_mut(&mut self) -> &mut [Binding] {
        &mut self.0
    }
}

impl FromIterator<Binding> for Bindings {
    fn from_iter<I: IntoIterator<Item = Binding>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Bindings {
    type Item = &'a Binding;
    type IntoIter = std::slice::Iter<'a, Binding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn arr() -> Expression {
        Expression::path("d", &["arr"])
    }

    fn single(b: Binding) -> Bindings {
        Bindings::from_iter([b])
    }

    #[test]
    fn test_strict_and_loose_equivalence() {
        let a = single(Binding::new("v", arr()));
        let b = single(Binding::new("w", arr()));
        assert!(!a.equivalent_to(&b));
        assert!(a.equivalent_expressions(&b));
        assert!(a.equivalent_to(&a.clone()));
    }

    #[test]
    fn test_subset_requires_permissive_target() {
        let plain = single(Binding::new("v", arr()));
        let within = single(Binding::new("v", arr()).descending());
        assert!(plain.subset_of(&within));
        assert!(!within.subset_of(&plain));

        let named = single(Binding::with_name("i", "v", arr()));
        assert!(plain.subset_of(&named));
        assert!(!named.subset_of(&plain));
    }

    #[test]
    fn test_rename_classification() {
        let from = single(Binding::new("v", arr()));
        assert_eq!(from.rename_variables(&from).options, BindingVarOptions::Same);

        let to = single(Binding::new("w", arr()));
        let renaming = from.rename_variables(&to);
        assert_eq!(renaming.options, BindingVarOptions::Differ);
        assert_eq!(renaming.mapping, vec![("v".to_string(), "w".to_string())]);
    }

    #[test]
    fn test_rename_conflict_on_capture() {
        let from = Bindings::from_iter([
            Binding::new("v", arr()),
            Binding::new("w", Expression::path("d", &["other"])),
        ]);
        let to = Bindings::from_iter([
            Binding::new("w", arr()),
            Binding::new("x", Expression::path("d", &["other"])),
        ]);
        assert!(from.rename_variables(&to).is_conflict());

        let shorter = single(Binding::new("w", arr()));
        assert!(from.rename_variables(&shorter).is_conflict());
    }

    #[test]
    fn test_identifiers_are_flagged() {
        let b = single(Binding::with_name("i", "v", arr()).static_binding());
        let ids = b.identifiers();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|e| e.flags().contains(Flags::BINDING_VARIABLE | Flags::STATIC_VARIABLE)));
        assert!(b.duplicate_variable(["x", "i"].into_iter()));
        assert!(!b.duplicate_variable(["x"].into_iter()));
    }
}
