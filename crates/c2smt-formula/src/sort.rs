//! Sorts (types) of terms

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest supported bitvector width. Reads of 64-bit heap cells concatenate
/// at most 64 bits, so 128 leaves room for intermediate results.
pub const MAX_BV_WIDTH: u32 = 128;

/// A sort (type) in the SMT-LIB language
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sort {
    Bool,
    Int,
    /// Bitvector sort with width
    BitVec(u32),
    /// Array sort: (Array index element)
    Array(Box<Sort>, Box<Sort>),
}

impl Sort {
    pub fn array(index: Sort, element: Sort) -> Self {
        Sort::Array(Box::new(index), Box::new(element))
    }

    pub fn is_bitvec(&self) -> bool {
        matches!(self, Sort::BitVec(_))
    }

    pub fn bv_width(&self) -> Option<u32> {
        match self {
            Sort::BitVec(w) => Some(*w),
            _ => None,
        }
    }

    /// Index and element sorts of an array sort
    pub fn array_parts(&self) -> Option<(&Sort, &Sort)> {
        match self {
            Sort::Array(i, e) => Some((i, e)),
            _ => None,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Int => write!(f, "Int"),
            Sort::BitVec(w) => write!(f, "(_ BitVec {w})"),
            Sort::Array(i, e) => write!(f, "(Array {i} {e})"),
        }
    }
}
