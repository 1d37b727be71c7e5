//! Reusable transient buffers
//!
//! Comprehensions and IN-list builds need short-lived vectors on every
//! evaluation. Buffers are taken from a `Pool` held by the execution context
//! and handed back by the `Pooled` guard's `Drop`, so every exit path
//! (including `?`) returns them.

use docql_value::Value;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A buffer that can be emptied for reuse
pub trait Reusable: Default + Send {
    fn reset(&mut self);
}

impl<T: Send> Reusable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reusable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Bounded free list of buffers
#[derive(Debug)]
pub struct Pool<T: Reusable> {
    free: Mutex<Vec<T>>,
    capacity: usize,
    outstanding: AtomicUsize,
}

impl<T: Reusable> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Take an empty buffer
    pub fn get(&self) -> Pooled<'_, T> {
        let item = self.free.lock().pop().unwrap_or_default();
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Pooled {
            pool: self,
            item: Some(item),
        }
    }

    fn put(&self, mut item: T) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        item.reset();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(item);
        }
    }

    /// Buffers currently handed out
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Buffers waiting for reuse
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

/// Scoped handle on a pooled buffer
#[derive(Debug)]
pub struct Pooled<'p, T: Reusable> {
    pool: &'p Pool<T>,
    item: Option<T>,
}

impl<T: Reusable> Pooled<'_, T> {
    /// Keep the buffer instead of returning it
    pub fn into_inner(mut self) -> T {
        self.pool.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.item.take().unwrap_or_default()
    }
}

impl<T: Reusable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // `item` is only taken by `into_inner` and `drop`, which consume the guard
        match &self.item {
            Some(item) => item,
            None => unreachable!("pooled buffer used after release"),
        }
    }
}

impl<T: Reusable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pooled buffer used after release"),
        }
    }
}

impl<T: Reusable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.put(item);
        }
    }
}

/// Variable bindings for one comprehension iteration
pub type BindingBuffer = Vec<(Arc<str>, Value)>;

/// The pools an execution context owns
#[derive(Debug)]
pub struct Pools {
    pub bindings: Pool<BindingBuffer>,
    pub values: Pool<Vec<Value>>,
    pub text: Pool<String>,
}

impl Pools {
    pub fn new(capacity: usize) -> Self {
        Self {
            bindings: Pool::new(capacity),
            values: Pool::new(capacity),
            text: Pool::new(capacity),
        }
    }

    /// Total buffers not yet returned
    pub fn outstanding(&self) -> usize {
        self.bindings.outstanding() + self.values.outstanding() + self.text.outstanding()
    }
}
