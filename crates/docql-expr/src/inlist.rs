//! Per-context hash tables for `IN` with a static right-hand side
//!
//! The compiled tree is shared by concurrent executions, so tables live in
//! the execution context, keyed by the identity of the `IN` node. A table is
//! built once under the cell's initialization lock; every later probe reads
//! it without locking.
//!
//! Each entry is reference counted: the context holds one reference from
//! registration until [`InlistHashes::clear`], and every evaluation holds
//! another through an [`InlistRef`] guard. The table is torn down when the
//! last reference is released.

use crate::error::EvalResult;
use crate::expression::NodeId;
use docql_value::{Number, Value};
use log::{debug, trace};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Integers at or past this magnitude may share an f64 with their neighbours
const EXACT_FLOAT_LIMIT: u64 = 1 << 53;

/// Marshaled members of a static array
///
/// Marshaled text is a faithful key only where numbers compare exactly.
/// Members holding a large integer, a large integral float or a non-finite
/// float are kept aside instead and compared one by one; they can only
/// equal values of the same kind.
#[derive(Debug, Default)]
pub struct HashTable {
    keys: HashSet<String>,
    inexact: Vec<Value>,
    has_null: bool,
    has_missing: bool,
}

impl HashTable {
    /// NULL and MISSING elements are recorded as flags, never inserted
    pub fn build(items: &[Value]) -> Self {
        let mut table = Self {
            keys: HashSet::with_capacity(items.len()),
            ..Self::default()
        };
        for item in items {
            match item {
                Value::Missing => table.has_missing = true,
                Value::Null => table.has_null = true,
                other if has_inexact_number(other) => table.inexact.push(other.clone()),
                other => {
                    table.keys.insert(other.marshal());
                }
            }
        }
        table
    }

    /// Membership of a known probe value, with the same unknown handling as
    /// a linear scan
    pub fn probe(&self, item: &Value) -> Value {
        let found = if has_inexact_number(item) {
            self.inexact.iter().any(|member| item.equals(member).truth())
        } else {
            let mut key = String::new();
            item.marshal_into(&mut key);
            self.keys.contains(&key)
        };
        if found {
            Value::TRUE
        } else if self.has_null {
            Value::Null
        } else if self.has_missing {
            Value::Missing
        } else {
            Value::FALSE
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len() + self.inexact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.inexact.is_empty()
    }

    pub fn has_null(&self) -> bool {
        self.has_null
    }

    pub fn has_missing(&self) -> bool {
        self.has_missing
    }
}

/// A number whose equality with the other numeric variant is not decided
/// by its marshaled text
fn has_inexact_number(value: &Value) -> bool {
    match value {
        Value::Number(Number::Int(i)) => i.unsigned_abs() >= EXACT_FLOAT_LIMIT,
        Value::Number(Number::Float(f)) => {
            !f.is_finite() || (f.fract() == 0.0 && f.abs() >= EXACT_FLOAT_LIMIT as f64)
        }
        Value::Array(items) => items.iter().any(has_inexact_number),
        Value::Object(fields) => fields.values().any(has_inexact_number),
        _ => false,
    }
}

/// State of one `IN` node within one context
#[derive(Debug)]
pub struct InlistHash {
    /// `Some(None)` records the decision not to hash
    table: OnceCell<Option<HashTable>>,
    refs: AtomicUsize,
}

impl InlistHash {
    fn new() -> Self {
        Self {
            table: OnceCell::new(),
            refs: AtomicUsize::new(1),
        }
    }

    /// The table, building it with `init` on first use
    pub fn get_or_build<F>(&self, init: F) -> EvalResult<Option<&HashTable>>
    where
        F: FnOnce() -> EvalResult<Option<HashTable>>,
    {
        Ok(self.table.get_or_try_init(init)?.as_ref())
    }

    pub fn is_built(&self) -> bool {
        self.table.get().is_some()
    }

    pub fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    fn size(&self) -> usize {
        self.table.get().and_then(|t| t.as_ref()).map_or(0, HashTable::len)
    }
}

/// One evaluation's reference to an `IN` node's state; released on drop
#[derive(Debug)]
pub struct InlistRef<'a> {
    hashes: &'a InlistHashes,
    id: NodeId,
    hash: Arc<InlistHash>,
}

impl InlistRef<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Deref for InlistRef<'_> {
    type Target = InlistHash;

    fn deref(&self) -> &InlistHash {
        &self.hash
    }
}

impl Drop for InlistRef<'_> {
    fn drop(&mut self) {
        self.hashes.release(self.id);
    }
}

/// All IN tables of an execution context
#[derive(Debug, Default)]
pub struct InlistHashes {
    entries: RwLock<HashMap<NodeId, Arc<InlistHash>>>,
}

impl InlistHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference to the state for `id`
    ///
    /// The first use registers the entry along with the context's own
    /// reference, so the table outlives a single evaluation.
    pub fn acquire(&self, id: NodeId) -> InlistRef<'_> {
        let hash = self.retain(id).unwrap_or_else(|| {
            let mut entries = self.entries.write();
            let hash = entries.entry(id).or_insert_with(|| {
                trace!("IN list hash {id:?} registered");
                Arc::new(InlistHash::new())
            });
            hash.refs.fetch_add(1, Ordering::AcqRel);
            Arc::clone(hash)
        });
        InlistRef { hashes: self, id, hash }
    }

    /// Add a reference to an already registered entry
    fn retain(&self, id: NodeId) -> Option<Arc<InlistHash>> {
        let entries = self.entries.read();
        let hash = entries.get(&id)?;
        hash.refs.fetch_add(1, Ordering::AcqRel);
        Some(Arc::clone(hash))
    }

    /// Drop a reference; the table is torn down with the last one
    ///
    /// Returns true when the entry was removed.
    fn release(&self, id: NodeId) -> bool {
        let mut entries = self.entries.write();
        let Some(hash) = entries.get(&id) else {
            return false;
        };
        if hash.refs.fetch_sub(1, Ordering::AcqRel) > 1 {
            return false;
        }
        if let Some(hash) = entries.remove(&id) {
            trace!("IN list hash {id:?} torn down ({} keys)", hash.size());
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop the context's reference to every entry
    ///
    /// Entries still held by an evaluation survive until their last
    /// [`InlistRef`] is dropped.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        if entries.is_empty() {
            return;
        }
        let before = entries.len();
        entries.retain(|id, hash| {
            let live = hash.refs.fetch_sub(1, Ordering::AcqRel) > 1;
            if !live {
                trace!("IN list hash {id:?} torn down ({} keys)", hash.size());
            }
            live
        });
        debug!("released {before} IN list hash tables, {} still in use", entries.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{ExprKind, Expression};

    fn node_id() -> NodeId {
        let e = Expression::in_list(Expression::identifier("x"), Expression::identifier("y"));
        match e.kind() {
            ExprKind::In(list) => list.id(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_lookup_flags() {
        let table = HashTable::build(&[Value::int(1), Value::Null, Value::Missing, "a".into()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.probe(&Value::float(1.0)), Value::TRUE);
        assert_eq!(table.probe(&Value::int(3)), Value::Null);

        let table = HashTable::build(&[Value::int(1), Value::Missing]);
        assert_eq!(table.probe(&Value::int(3)), Value::Missing);

        let table = HashTable::build(&[Value::int(1)]);
        assert_eq!(table.probe(&Value::int(3)), Value::FALSE);
    }

    #[test]
    fn test_lookup_large_numbers() {
        let limit = 9_007_199_254_740_992i64;
        let mut items: Vec<Value> = (0..20).map(Value::int).collect();
        items.push(Value::float(limit as f64));
        items.push(Value::float(f64::INFINITY));
        let table = HashTable::build(&items);

        for needle in [
            Value::int(limit + 1),
            Value::int(limit),
            Value::int(limit + 4),
            Value::float(f64::NEG_INFINITY),
            Value::float(f64::NAN),
            Value::array([Value::int(limit + 1)]),
        ] {
            assert_eq!(table.probe(&needle), crate::eval::scan_members(&needle, &items), "{needle:?}");
        }
        assert_eq!(table.len(), 22);
        assert_eq!(table.probe(&Value::int(limit + 1)), Value::TRUE);
        assert_eq!(table.probe(&Value::float(f64::NAN)), Value::FALSE);

        let with_null_text = HashTable::build(&[Value::array([Value::Null])]);
        assert_eq!(with_null_text.probe(&Value::array([Value::float(f64::NAN)])), Value::FALSE);
    }

    #[test]
    fn test_build_once() {
        let hashes = InlistHashes::new();
        let id = node_id();
        let hash = hashes.acquire(id);
        let mut builds = 0;
        for _ in 0..3 {
            let table = hash
                .get_or_build(|| {
                    builds += 1;
                    Ok(Some(HashTable::build(&[Value::int(1)])))
                })
                .unwrap();
            assert!(table.is_some());
        }
        assert_eq!(builds, 1);
        assert!(hashes.acquire(id).is_built());
    }

    #[test]
    fn test_refs_follow_guards() {
        let hashes = InlistHashes::new();
        let id = node_id();
        {
            let first = hashes.acquire(id);
            assert_eq!(first.refs(), 2);
        }
        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes.acquire(id).refs(), 2);
    }

    #[test]
    fn test_teardown_after_last_user() {
        let hashes = InlistHashes::new();
        let id = node_id();
        let first = hashes.acquire(id);
        let second = hashes.acquire(id);
        assert_eq!(second.refs(), 3);
        first
            .get_or_build(|| Ok(Some(HashTable::build(&[Value::int(1)]))))
            .unwrap();
        assert!(second.is_built());

        hashes.clear();
        assert_eq!(hashes.len(), 1);
        drop(first);
        assert_eq!(hashes.len(), 1);
        assert_eq!(second.refs(), 1);
        drop(second);
        assert!(hashes.is_empty());
    }

    #[test]
    fn test_concurrent_users_share_table() {
        let hashes = InlistHashes::new();
        let id = node_id();
        let builds = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let hash = hashes.acquire(id);
                    let table = hash
                        .get_or_build(|| {
                            builds.fetch_add(1, Ordering::SeqCst);
                            Ok(Some(HashTable::build(&[Value::int(7)])))
                        })
                        .unwrap()
                        .unwrap();
                    assert_eq!(table.probe(&Value::int(7)), Value::TRUE);
                });
            }
        });
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(hashes.acquire(id).refs(), 2);
        hashes.clear();
        assert!(hashes.is_empty());
    }
}
