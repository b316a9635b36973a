//! Index-safe per-thread storage
//!
//! A small vector that can only be indexed by [`ThreadIndex`], so a raw
//! `usize` can never be used to address the wrong table.

use core::ops::{Index, IndexMut};

use crate::index::ThreadIndex;
use crate::set::ThreadSet;

/// One value of type `T` per logical test thread
///
/// Length is fixed at construction and bounded by [`ThreadSet::CAPACITY`].
#[derive(Debug)]
pub struct PerThread<T> {
    items: Vec<T>,
}

impl<T> PerThread<T> {
    /// Wrap an existing vector, one element per thread
    ///
    /// Panics if `items` has more elements than a [`ThreadSet`] can address.
    pub fn new(items: Vec<T>) -> Self {
        assert!(
            items.len() <= ThreadSet::CAPACITY,
            "{} threads exceed the set capacity of {}",
            items.len(),
            ThreadSet::CAPACITY
        );
        PerThread { items }
    }

    /// Build a table by calling `f` once per index
    pub fn from_fn(n: usize, mut f: impl FnMut(ThreadIndex) -> T) -> Self {
        assert!(n <= ThreadSet::CAPACITY, "{} threads exceed the set capacity", n);
        PerThread {
            items: (0..n as u32).map(|i| f(ThreadIndex::new(i))).collect(),
        }
    }

    /// Number of threads
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when there are no threads
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All valid indexes, in ascending order
    pub fn indices(&self) -> impl Iterator<Item = ThreadIndex> {
        (0..self.items.len() as u32).map(ThreadIndex::new)
    }

    /// Iterate over the values
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Iterate over the values mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    /// Consume the table, yielding the inner vector
    pub fn into_inner(self) -> Vec<T> {
        self.items
    }
}

impl<T> Index<ThreadIndex> for PerThread<T> {
    type Output = T;

    #[inline]
    fn index(&self, thi: ThreadIndex) -> &T {
        &self.items[thi.as_usize()]
    }
}

impl<T> IndexMut<ThreadIndex> for PerThread<T> {
    #[inline]
    fn index_mut(&mut self, thi: ThreadIndex) -> &mut T {
        &mut self.items[thi.as_usize()]
    }
}
