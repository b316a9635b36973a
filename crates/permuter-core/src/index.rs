//! Thread index type

use core::fmt;

use crate::set::ThreadSet;

/// Identifies one logical test thread within a permuter session
///
/// This is a small integer in `[0, ThreadSet::CAPACITY)` that indexes into
/// the per-thread arrays and selects one bit of a [`ThreadSet`].
/// It also doubles as one character of a schedule string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ThreadIndex(u32);

impl ThreadIndex {
    /// Create a new ThreadIndex from a raw value
    ///
    /// Panics if `idx` is not below [`ThreadSet::CAPACITY`].
    #[inline]
    pub fn new(idx: u32) -> Self {
        assert!(
            (idx as usize) < ThreadSet::CAPACITY,
            "thread index {} out of range",
            idx
        );
        ThreadIndex(idx)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The schedule-string character for this index
    ///
    /// Indices 0-9 map to `'0'`-`'9'`, indices 10 and up to `'a'`-`'v'`.
    /// One character per step keeps schedule strings compact and
    /// reproducible for every capacity the set representation supports.
    #[inline]
    pub fn digit(self) -> char {
        // Capacity is at most 32, so base 36 always fits.
        char::from_digit(self.0, 36).unwrap_or('?')
    }

    /// Parse a schedule-string character back into an index
    ///
    /// Returns `None` for characters outside the digit alphabet or for
    /// indices at or above `n`, the session's thread count.
    pub fn from_digit(c: char, n: usize) -> Option<ThreadIndex> {
        let v = c.to_digit(36)?;
        if (v as usize) < n {
            Some(ThreadIndex(v))
        } else {
            None
        }
    }
}

impl From<ThreadIndex> for u32 {
    #[inline]
    fn from(thi: ThreadIndex) -> Self {
        thi.0
    }
}

impl fmt::Debug for ThreadIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadIndex({})", self.0)
    }
}

impl fmt::Display for ThreadIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digit())
    }
}
