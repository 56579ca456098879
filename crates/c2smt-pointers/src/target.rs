//! Pointer targets and trackable composite fields

use c2smt_formula::{FormulaResult, Sort, Term};
use c2smt_types::CType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Prefix of the symbol holding the address of a base
pub const ADDRESS_PREFIX: &str = "__ADDRESS_OF_";

/// Address symbol of a base
pub fn base_address_name(base: &str) -> String {
    format!("{ADDRESS_PREFIX}{base}")
}

/// Address term of a base in an address space of `pointer_width` bits
pub fn base_address(base: &str, pointer_width: u32) -> Term {
    Term::var(base_address_name(base), Sort::BitVec(pointer_width))
}

/// A concrete memory location inside a base.
///
/// `proper_offset` is the offset within the innermost container,
/// `container_offset` the offset of that container within the base. The
/// container type is absent for scalar bases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointerTarget {
    pub base: String,
    pub container_type: Option<CType>,
    pub proper_offset: u64,
    pub container_offset: u64,
}

impl PointerTarget {
    pub fn new(
        base: impl Into<String>,
        container_type: Option<CType>,
        proper_offset: u64,
        container_offset: u64,
    ) -> Self {
        Self {
            base: base.into(),
            container_type,
            proper_offset,
            container_offset,
        }
    }

    /// Offset within the base
    pub fn offset(&self) -> u64 {
        self.container_offset + self.proper_offset
    }

    /// `__ADDRESS_OF_base + offset`
    pub fn address(&self, pointer_width: u32) -> FormulaResult<Term> {
        Term::bv_add(
            base_address(&self.base, pointer_width),
            Term::bv(i128::from(self.offset()), pointer_width),
        )
    }
}

impl fmt::Display for PointerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container_type {
            Some(ty) => write!(
                f,
                "({} + {}: {} + {})",
                self.base, self.container_offset, ty, self.proper_offset
            ),
            None => write!(f, "({} + {})", self.base, self.proper_offset),
        }
    }
}

/// A struct or union member tracked individually in the heap.
///
/// Ordered by owner type string, then field name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositeField {
    pub composite_type: Arc<str>,
    pub field_name: Arc<str>,
}

impl CompositeField {
    pub fn new(composite_type: &CType, field_name: &str) -> Self {
        Self {
            composite_type: composite_type.type_to_string().into(),
            field_name: field_name.into(),
        }
    }

    /// From an already rendered owner type
    pub fn named(composite_type: &str, field_name: &str) -> Self {
        Self {
            composite_type: composite_type.into(),
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for CompositeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.composite_type, self.field_name)
    }
}
