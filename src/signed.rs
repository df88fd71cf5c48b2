//! Signed index encoding for oriented degrees of freedom.
//!
//! Vector-valued discretizations (edge and face elements) attach an orientation to each
//! element-local DOF: the same global DOF may be seen with opposite orientations by two
//! neighboring elements. The orientation is folded into the index itself:
//!
//! - a non-negative value `v` is the index `v` with positive orientation,
//! - a negative value `v` is the index `-1 - v` (the bitwise complement) with reversed
//!   orientation.
use crate::Real;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An index carrying an orientation flag in its sign.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SignedIndex(isize);

impl SignedIndex {
    /// Encode an index with the given orientation.
    #[inline]
    pub fn new(index: usize, reversed: bool) -> Self {
        let index = index as isize;
        if reversed {
            Self(!index)
        } else {
            Self(index)
        }
    }

    /// An index with positive orientation.
    #[inline]
    pub fn positive(index: usize) -> Self {
        Self::new(index, false)
    }

    /// An index with reversed orientation.
    #[inline]
    pub fn reversed(index: usize) -> Self {
        Self::new(index, true)
    }

    /// Interpret a raw signed value (as produced by an incidence provider).
    #[inline]
    pub fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(&self) -> isize {
        self.0
    }

    /// The decoded index, discarding the orientation.
    #[inline]
    pub fn index(&self) -> usize {
        if self.0 >= 0 {
            self.0 as usize
        } else {
            (!self.0) as usize
        }
    }

    #[inline]
    pub fn is_reversed(&self) -> bool {
        self.0 < 0
    }

    /// Whether both indices are seen with the same orientation.
    #[inline]
    pub fn same_orientation(&self, other: &SignedIndex) -> bool {
        self.is_reversed() == other.is_reversed()
    }

    /// `+1` if both indices share their orientation, `-1` otherwise.
    #[inline]
    pub fn relative_sign<T: Real>(&self, other: &SignedIndex) -> T {
        if self.same_orientation(other) {
            T::one()
        } else {
            -T::one()
        }
    }

    /// Replace the index while keeping the orientation.
    #[inline]
    pub fn with_index(&self, index: usize) -> Self {
        Self::new(index, self.is_reversed())
    }
}

impl fmt::Debug for SignedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_reversed() {
            write!(f, "-{}", self.index())
        } else {
            write!(f, "+{}", self.index())
        }
    }
}
