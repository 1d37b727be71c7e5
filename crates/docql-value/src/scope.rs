//! Evaluation items
//!
//! A `Scope` is what an expression is evaluated against: a base document,
//! variables bound by an enclosing comprehension, and the scope it was
//! derived from. Scopes only borrow; the buffers behind child bindings are
//! owned (and pooled) by the caller.

use crate::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// Annotations on an item (document metadata read by `META()`)
pub type Attachments = IndexMap<String, Value>;

/// A chain of variable scopes over an optional base value
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
    base: Option<&'a Value>,
    bindings: &'a [(Arc<str>, Value)],
    parent: Option<&'a Scope<'a>>,
    attachments: Option<&'a Attachments>,
}

impl<'a> Scope<'a> {
    /// Scope with nothing in it; used when probing for constant values
    pub const fn empty() -> Scope<'static> {
        Scope {
            base: None,
            bindings: &[],
            parent: None,
            attachments: None,
        }
    }

    /// Scope whose identifiers resolve to fields of `base`
    pub fn new(base: &'a Value) -> Self {
        Self {
            base: Some(base),
            ..Self::default()
        }
    }

    /// Scope holding only named variables
    pub fn with_bindings(bindings: &'a [(Arc<str>, Value)]) -> Self {
        Self {
            bindings,
            ..Self::default()
        }
    }

    pub fn with_attachments(mut self, attachments: &'a Attachments) -> Self {
        self.attachments = Some(attachments);
        self
    }

    pub fn with_parent(mut self, parent: &'a Scope<'a>) -> Self {
        if self.attachments.is_none() {
            self.attachments = parent.attachments;
        }
        self.parent = Some(parent);
        self
    }

    /// Derive a scope that adds `bindings` on top of this one, carrying the
    /// annotations forward
    pub fn child<'b>(&'b self, bindings: &'b [(Arc<str>, Value)]) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            base: None,
            bindings,
            parent: Some(self),
            attachments: self.attachments,
        }
    }

    /// Resolve a name: own bindings, then base fields, then the parent
    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        if let Some((_, v)) = self.bindings.iter().rev().find(|(n, _)| n.as_ref() == name) {
            return Some(v);
        }
        if let Some(v) = self.base.and_then(|b| b.get_field(name)) {
            return Some(v);
        }
        self.parent.and_then(|p| p.lookup(name))
    }

    /// Like `lookup`, ignoring case
    pub fn lookup_ci(&self, name: &str) -> Option<&'a Value> {
        let lower = name.to_lowercase();
        if let Some((_, v)) = self
            .bindings
            .iter()
            .rev()
            .find(|(n, _)| n.to_lowercase() == lower)
        {
            return Some(v);
        }
        if let Some(v) = self.base.and_then(|b| b.get_field_ci(name)) {
            return Some(v);
        }
        self.parent.and_then(|p| p.lookup_ci(name))
    }

    /// Nearest base value up the chain
    pub fn base(&self) -> Option<&'a Value> {
        self.base.or_else(|| self.parent.and_then(|p| p.base()))
    }

    pub fn attachments(&self) -> Option<&'a Attachments> {
        self.attachments
    }

    pub fn bindings(&self) -> &'a [(Arc<str>, Value)] {
        self.bindings
    }

    pub fn parent(&self) -> Option<&'a Scope<'a>> {
        self.parent
    }

    /// Nothing bound and no base value anywhere in the chain
    pub fn is_empty(&self) -> bool {
        self.base.is_none()
            && self.bindings.is_empty()
            && self.parent.is_none_or(|p| p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_order() {
        let doc = Value::from(json!({"x": 1, "y": 2}));
        let root = Scope::new(&doc);
        assert_eq!(root.lookup("x"), Some(&Value::int(1)));

        let vars = [(Arc::<str>::from("x"), Value::int(10))];
        let inner = root.child(&vars);
        assert_eq!(inner.lookup("x"), Some(&Value::int(10)));
        assert_eq!(inner.lookup("y"), Some(&Value::int(2)));
        assert_eq!(inner.lookup("z"), None);
        assert_eq!(inner.base(), Some(&doc));
    }

    #[test]
    fn test_attachments_carried_to_children() {
        let doc = Value::from(json!({}));
        let mut meta = Attachments::new();
        meta.insert("id".into(), Value::string("k1"));
        let root = Scope::new(&doc).with_attachments(&meta);
        let none: [(Arc<str>, Value); 0] = [];
        let child = root.child(&none);
        assert_eq!(child.attachments().and_then(|a| a.get("id")), Some(&Value::string("k1")));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let vars = [(Arc::<str>::from("Item"), Value::TRUE)];
        let scope = Scope::with_bindings(&vars);
        assert_eq!(scope.lookup("item"), None);
        assert_eq!(scope.lookup_ci("item"), Some(&Value::TRUE));
        assert!(Scope::empty().is_empty());
    }
}
