//! Configuration types for the pointer-aliasing encoder

use crate::target::CompositeField;
use c2smt_formula::Sort;
use c2smt_types::CType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Theory used to model the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HeapEncoding {
    /// One uninterpreted function per region
    #[default]
    UninterpretedFunctions,

    /// One array per region
    Arrays,

    /// A single byte-indexed array shared by all regions
    ByteArray,
}

/// Byte order of multi-byte values in the byte-array heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Treatment of accesses whose width is not a whole number of bytes in the
/// byte-array heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SubBytePolicy {
    /// Fail with an unsupported-construct error
    #[default]
    Reject,

    /// Round the access up to whole bytes; the padding bits are zero on
    /// write and dropped on read
    Widen,
}

/// Configuration for the pointer-aliasing encoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerAliasingConfig {
    /// Heap theory (default: uninterpreted functions)
    pub heap_encoding: HeapEncoding,

    /// Use Burstall-Bornat field regions instead of one region per type
    pub use_memory_regions: bool,

    /// Byte order for the byte-array heap
    pub endianness: Endianness,

    /// Width of addresses in bits
    pub pointer_width: u32,

    /// Maximum number of array elements materialised as targets
    pub max_array_length: usize,

    /// Assumed length of arrays without a literal length
    pub default_array_length: usize,

    /// Track `malloc` results without a known type as deferred allocations
    pub defer_untyped_allocations: bool,

    /// Zeroed allocations up to this many bytes get explicit zero
    /// initialisation (0 disables)
    pub max_prefilled_allocation_size: u64,

    /// Sub-byte access policy for the byte-array heap
    pub byte_array_sub_byte_policy: SubBytePolicy,

    /// Functions returning fresh uninitialised memory; the size is the
    /// first argument
    pub memory_allocation_functions: Vec<String>,

    /// Functions returning fresh zeroed memory; the size is the product of
    /// all arguments
    pub zeroing_allocation_functions: Vec<String>,
}

impl Default for PointerAliasingConfig {
    fn default() -> Self {
        Self {
            heap_encoding: HeapEncoding::default(),
            use_memory_regions: false,
            endianness: Endianness::default(),
            pointer_width: 64,
            max_array_length: 100,
            default_array_length: 20,
            defer_untyped_allocations: true,
            max_prefilled_allocation_size: 0,
            byte_array_sub_byte_policy: SubBytePolicy::default(),
            memory_allocation_functions: ["malloc", "__kmalloc", "kmalloc", "alloca", "__builtin_alloca"]
                .map(String::from)
                .to_vec(),
            zeroing_allocation_functions: ["calloc", "kzalloc"].map(String::from).to_vec(),
        }
    }
}

impl PointerAliasingConfig {
    /// Sort of address terms
    pub fn address_sort(&self) -> Sort {
        Sort::BitVec(self.pointer_width)
    }

    /// Whether `function` allocates memory, and if so whether it zeroes it
    pub fn allocation_kind(&self, function: &str) -> Option<bool> {
        if self.zeroing_allocation_functions.iter().any(|f| f == function) {
            Some(true)
        } else if self.memory_allocation_functions.iter().any(|f| f == function) {
            Some(false)
        } else {
            None
        }
    }

    /// Number of elements of an array type that are tracked as targets
    pub fn tracked_array_length(&self, array: &CType) -> usize {
        match array {
            CType::Array(_, Some(len)) => (*len).min(self.max_array_length),
            _ => self.default_array_length.min(self.max_array_length),
        }
    }
}

/// Result of the variable classification used to build field regions.
///
/// Relevant fields are read or written somewhere; addressed fields have
/// their address taken. Addressed variables live in the heap as bases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldClassification {
    pub relevant: BTreeSet<CompositeField>,
    pub addressed: BTreeSet<CompositeField>,
    pub addressed_variables: BTreeSet<String>,
}

impl FieldClassification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relevant(mut self, field: CompositeField) -> Self {
        self.relevant.insert(field);
        self
    }

    pub fn with_addressed(mut self, field: CompositeField) -> Self {
        self.addressed.insert(field);
        self
    }

    pub fn with_addressed_variable(mut self, name: impl Into<String>) -> Self {
        self.addressed_variables.insert(name.into());
        self
    }

    /// Fields that get a region of their own
    pub fn field_region_candidates(&self) -> impl Iterator<Item = &CompositeField> {
        self.relevant.difference(&self.addressed)
    }

    pub fn is_addressed_variable(&self, name: &str) -> bool {
        self.addressed_variables.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PointerAliasingConfig::default();
        assert_eq!(config.heap_encoding, HeapEncoding::UninterpretedFunctions);
        assert_eq!(config.pointer_width, 64);
        assert_eq!(config.byte_array_sub_byte_policy, SubBytePolicy::Reject);
        assert_eq!(config.address_sort(), Sort::BitVec(64));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: PointerAliasingConfig =
            serde_json::from_str(r#"{"heap_encoding": "ByteArray", "endianness": "Big"}"#).unwrap();
        assert_eq!(config.heap_encoding, HeapEncoding::ByteArray);
        assert_eq!(config.endianness, Endianness::Big);
        assert_eq!(config.max_array_length, 100);
    }

    #[test]
    fn test_allocation_functions() {
        let config = PointerAliasingConfig::default();
        assert_eq!(config.allocation_kind("malloc"), Some(false));
        assert_eq!(config.allocation_kind("calloc"), Some(true));
        assert_eq!(config.allocation_kind("free"), None);
    }

    #[test]
    fn test_tracked_array_length() {
        let config = PointerAliasingConfig {
            max_array_length: 8,
            ..Default::default()
        };
        assert_eq!(config.tracked_array_length(&CType::array(CType::int(), 3)), 3);
        assert_eq!(config.tracked_array_length(&CType::array(CType::int(), 300)), 8);
        assert_eq!(config.tracked_array_length(&CType::unsized_array(CType::int())), 8);
    }

    #[test]
    fn test_field_region_candidates() {
        let f = CompositeField::named("struct S", "f");
        let g = CompositeField::named("struct S", "g");
        let c = FieldClassification::new()
            .with_relevant(f.clone())
            .with_relevant(g.clone())
            .with_addressed(f);
        assert_eq!(c.field_region_candidates().collect::<Vec<_>>(), vec![&g]);
    }
}
