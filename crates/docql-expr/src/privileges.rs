//! Privileges required to evaluate an expression

use std::collections::BTreeSet;
use std::fmt;

/// Kind of access a privilege grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Privilege {
    Read,
    Write,
    Execute,
    Admin,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
            Self::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Set of (target, privilege) pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Privileges {
    entries: BTreeSet<(String, Privilege)>,
}

impl Privileges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, target: impl Into<String>, privilege: Privilege) {
        self.entries.insert((target.into(), privilege));
    }

    /// Union `other` into `self`
    pub fn add_all(&mut self, other: &Privileges) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn contains(&self, target: &str, privilege: Privilege) -> bool {
        self.entries
            .iter()
            .any(|(t, p)| t == target && *p == privilege)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Privilege)> {
        self.entries.iter().map(|(t, p)| (t.as_str(), *p))
    }
}

impl FromIterator<(String, Privilege)> for Privileges {
    fn from_iter<I: IntoIterator<Item = (String, Privilege)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
