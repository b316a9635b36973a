//! Thread subset bit-set
//!
//! A [`ThreadSet`] is an immutable-value bit-set over [`ThreadIndex`].
//! The scheduler keeps four of these (running / blocked / waiting / woken)
//! and snapshots them freely, so the type is `Copy` and every operator
//! returns a new value instead of mutating in place.

use core::fmt;
use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not, Sub, SubAssign};

use crate::index::ThreadIndex;

type Mask = u32;

/// An immutable-value set of thread indexes
///
/// Backed by a single `u32` mask; bit `i` set means thread `i` is a member.
/// Word scans use `trailing_zeros`, so `first()` and `next_above()` are O(1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ThreadSet(Mask);

impl ThreadSet {
    /// Maximum number of threads a set can represent
    pub const CAPACITY: usize = Mask::BITS as usize;

    /// The empty set
    #[inline]
    pub const fn empty() -> Self {
        ThreadSet(0)
    }

    /// The set containing all indexes in `[0, n)`
    ///
    /// Panics if `n` exceeds [`Self::CAPACITY`].
    #[inline]
    pub fn full(n: usize) -> Self {
        assert!(n <= Self::CAPACITY, "thread count {} exceeds capacity", n);
        if n == Self::CAPACITY {
            ThreadSet(Mask::MAX)
        } else {
            ThreadSet((1 << n) - 1)
        }
    }

    /// The singleton set `{thi}`
    #[inline]
    pub fn single(thi: ThreadIndex) -> Self {
        ThreadSet(1 << thi.as_u32())
    }

    /// Add `thi` to the set
    #[inline]
    pub fn insert(&mut self, thi: ThreadIndex) {
        self.0 |= 1 << thi.as_u32();
    }

    /// Remove `thi` from the set
    #[inline]
    pub fn remove(&mut self, thi: ThreadIndex) {
        self.0 &= !(1 << thi.as_u32());
    }

    /// Membership test
    #[inline]
    pub const fn contains(self, thi: ThreadIndex) -> bool {
        self.0 & (1 << thi.as_u32()) != 0
    }

    /// True when the set has at least one member
    #[inline]
    pub const fn any(self) -> bool {
        self.0 != 0
    }

    /// True when the set is empty
    #[inline]
    pub const fn none(self) -> bool {
        self.0 == 0
    }

    /// True when the set has exactly one member
    #[inline]
    pub const fn is_single(self) -> bool {
        self.0.is_power_of_two()
    }

    /// Number of members
    #[inline]
    pub const fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Lowest member, if any
    #[inline]
    pub fn first(self) -> Option<ThreadIndex> {
        if self.0 == 0 {
            None
        } else {
            Some(ThreadIndex::new(self.0.trailing_zeros()))
        }
    }

    /// Lowest member strictly greater than `thi`, if any
    #[inline]
    pub fn next_above(self, thi: ThreadIndex) -> Option<ThreadIndex> {
        let above = if thi.as_u32() + 1 >= Mask::BITS {
            0
        } else {
            self.0 >> (thi.as_u32() + 1) << (thi.as_u32() + 1)
        };
        if above == 0 {
            None
        } else {
            Some(ThreadIndex::new(above.trailing_zeros()))
        }
    }

    /// Complement with respect to the universe `[0, n)`
    #[inline]
    pub fn complement(self, n: usize) -> Self {
        ThreadSet(!self.0) & Self::full(n)
    }

    /// Iterate over members in ascending index order
    #[inline]
    pub fn iter(self) -> Iter {
        Iter(self.0)
    }
}

impl BitOr for ThreadSet {
    type Output = ThreadSet;
    #[inline]
    fn bitor(self, rhs: ThreadSet) -> ThreadSet {
        ThreadSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for ThreadSet {
    #[inline]
    fn bitor_assign(&mut self, rhs: ThreadSet) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ThreadSet {
    type Output = ThreadSet;
    #[inline]
    fn bitand(self, rhs: ThreadSet) -> ThreadSet {
        ThreadSet(self.0 & rhs.0)
    }
}

impl BitAndAssign for ThreadSet {
    #[inline]
    fn bitand_assign(&mut self, rhs: ThreadSet) {
        self.0 &= rhs.0;
    }
}

/// Set difference: members of `self` that are not in `rhs`
impl Sub for ThreadSet {
    type Output = ThreadSet;
    #[inline]
    fn sub(self, rhs: ThreadSet) -> ThreadSet {
        ThreadSet(self.0 & !rhs.0)
    }
}

impl SubAssign for ThreadSet {
    #[inline]
    fn sub_assign(&mut self, rhs: ThreadSet) {
        self.0 &= !rhs.0;
    }
}

impl Not for ThreadSet {
    type Output = ThreadSet;
    #[inline]
    fn not(self) -> ThreadSet {
        ThreadSet(!self.0)
    }
}

impl FromIterator<ThreadIndex> for ThreadSet {
    fn from_iter<I: IntoIterator<Item = ThreadIndex>>(iter: I) -> Self {
        let mut set = ThreadSet::empty();
        for thi in iter {
            set.insert(thi);
        }
        set
    }
}

impl IntoIterator for ThreadSet {
    type Item = ThreadIndex;
    type IntoIter = Iter;
    fn into_iter(self) -> Iter {
        self.iter()
    }
}

/// Ascending iterator over set members
pub struct Iter(Mask);

impl Iterator for Iter {
    type Item = ThreadIndex;

    fn next(&mut self) -> Option<ThreadIndex> {
        if self.0 == 0 {
            return None;
        }
        let idx = self.0.trailing_zeros();
        self.0 &= self.0 - 1; // clear lowest set bit
        Some(ThreadIndex::new(idx))
    }
}

impl fmt::Display for ThreadSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut sep = "";
        for thi in self.iter() {
            write!(f, "{}{}", sep, thi.as_u32())?;
            sep = ", ";
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for ThreadSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadSet{}", self)
    }
}
