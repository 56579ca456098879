//! Deferred (not yet typed) allocations
//!
//! `p = malloc(n)` produces memory whose type is only revealed by a later
//! cast. Until then the allocation is tracked in a pool shared by every
//! pointer variable that may point to it. Pools of different paths collapse
//! when the paths merge, so one pool can stand for several base variables.

use im::OrdSet;
use serde::{Deserialize, Serialize};

/// A completed allocation whose type is not known yet
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeferredAllocation {
    pub base: String,
    pub size: Option<u64>,
    pub zeroed: bool,
}

/// Pointer variables and base variables sharing one untyped allocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeferredAllocationPool {
    pointer_variables: OrdSet<String>,
    base_variables: OrdSet<String>,
    size: Option<u64>,
    zeroed: bool,
}

impl DeferredAllocationPool {
    pub fn new(
        pointer_variable: impl Into<String>,
        base_variable: impl Into<String>,
        size: Option<u64>,
        zeroed: bool,
    ) -> Self {
        Self {
            pointer_variables: OrdSet::unit(pointer_variable.into()),
            base_variables: OrdSet::unit(base_variable.into()),
            size,
            zeroed,
        }
    }

    pub fn pointer_variables(&self) -> &OrdSet<String> {
        &self.pointer_variables
    }

    pub fn base_variables(&self) -> &OrdSet<String> {
        &self.base_variables
    }

    /// Literal allocation size, if all merged allocations agree on one
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn is_zeroed(&self) -> bool {
        self.zeroed
    }

    /// Whether no pointer variable refers to the pool anymore
    pub fn is_unreferenced(&self) -> bool {
        self.pointer_variables.is_empty()
    }

    /// Union of both pools. Differing sizes degrade to unknown; the result is
    /// zeroed only if both are.
    pub fn merge(&self, other: &DeferredAllocationPool) -> DeferredAllocationPool {
        let size = match (self.size, other.size) {
            (Some(a), Some(b)) if a == b => Some(a),
            _ => None,
        };
        DeferredAllocationPool {
            pointer_variables: self
                .pointer_variables
                .clone()
                .union(other.pointer_variables.clone()),
            base_variables: self.base_variables.clone().union(other.base_variables.clone()),
            size,
            zeroed: self.zeroed && other.zeroed,
        }
    }

    pub fn with_pointer(&self, pointer_variable: impl Into<String>) -> DeferredAllocationPool {
        DeferredAllocationPool {
            pointer_variables: self.pointer_variables.update(pointer_variable.into()),
            ..self.clone()
        }
    }

    /// Drop a pointer variable; base variables stay resolvable
    pub fn without_pointer(&self, pointer_variable: &str) -> DeferredAllocationPool {
        DeferredAllocationPool {
            pointer_variables: self.pointer_variables.without(pointer_variable),
            ..self.clone()
        }
    }

    /// Drop the base variables for which `resolved` holds
    pub fn without_bases(&self, resolved: impl Fn(&str) -> bool) -> DeferredAllocationPool {
        DeferredAllocationPool {
            base_variables: self
                .base_variables
                .iter()
                .filter(|b| !resolved(b.as_str()))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    /// One allocation per base variable
    pub fn allocations(&self) -> Vec<DeferredAllocation> {
        self.base_variables
            .iter()
            .map(|base| DeferredAllocation {
                base: base.clone(),
                size: self.size,
                zeroed: self.zeroed,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sizes() {
        let a = DeferredAllocationPool::new("p", "__alloc_1", Some(8), true);
        let b = DeferredAllocationPool::new("q", "__alloc_2", Some(8), false);
        let c = DeferredAllocationPool::new("r", "__alloc_3", Some(16), true);

        let ab = a.merge(&b);
        assert_eq!(ab.size(), Some(8));
        assert!(!ab.is_zeroed());
        assert_eq!(ab.pointer_variables().len(), 2);
        assert_eq!(ab.base_variables().len(), 2);

        let ac = a.merge(&c);
        assert_eq!(ac.size(), None);
        assert!(ac.is_zeroed());
    }

    #[test]
    fn test_without_last_pointer_keeps_bases() {
        let pool = DeferredAllocationPool::new("p", "__alloc_1", None, false);
        let empty = pool.without_pointer("p");
        assert!(empty.is_unreferenced());
        assert_eq!(
            empty.allocations(),
            vec![DeferredAllocation {
                base: "__alloc_1".into(),
                size: None,
                zeroed: false,
            }]
        );
    }

    #[test]
    fn test_without_bases_keeps_pointers() {
        let pool = DeferredAllocationPool::new("p", "__alloc_1", Some(8), false)
            .merge(&DeferredAllocationPool::new("q", "__alloc_2", Some(8), false));
        let rest = pool.without_bases(|b| b == "__alloc_1");
        assert_eq!(rest.base_variables().len(), 1);
        assert!(rest.base_variables().contains("__alloc_2"));
        assert_eq!(rest.pointer_variables(), pool.pointer_variables());
    }

    #[test]
    fn test_with_pointer_is_persistent() {
        let pool = DeferredAllocationPool::new("p", "__alloc_1", Some(4), false);
        let shared = pool.with_pointer("q");
        assert_eq!(pool.pointer_variables().len(), 1);
        assert!(shared.pointer_variables().contains("q"));
    }
}
