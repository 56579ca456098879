//! Joining the pointer target sets of two paths

use crate::config::PointerAliasingConfig;
use crate::deferred::DeferredAllocationPool;
use crate::error::{EncodingError, EncodingResult};
use crate::pointer_target_set::{base_address_constraints, PointerTargetSet};
use crate::region::MemoryRegionManager;
use crate::ssa::Constraints;
use crate::target::base_address;
use c2smt_formula::Term;
use c2smt_types::CType;
use im::{OrdMap, OrdSet, Vector};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Merged snapshot plus the constraints each incoming path must add
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub pts: PointerTargetSet,
    /// Constraints to conjoin to the left path's formula
    pub left_constraints: Constraints,
    /// Constraints to conjoin to the right path's formula
    pub right_constraints: Constraints,
}

/// Merges snapshots at join points
#[derive(Debug, Clone)]
pub struct PointerTargetSetMerger {
    config: Arc<PointerAliasingConfig>,
    regions: Arc<dyn MemoryRegionManager>,
}

impl PointerTargetSetMerger {
    pub fn new(config: Arc<PointerAliasingConfig>, regions: Arc<dyn MemoryRegionManager>) -> Self {
        Self { config, regions }
    }

    /// Join `left` and `right`. Merging a snapshot with itself returns it.
    pub fn merge(
        &self,
        left: &PointerTargetSet,
        right: &PointerTargetSet,
    ) -> EncodingResult<MergeResult> {
        let width = self.config.pointer_width;
        let bases = merge_bases(&left.bases, &right.bases)?;

        let mut left_constraints = Constraints::new();
        let mut right_constraints = Constraints::new();
        for name in left.bases.keys().filter(|n| !right.bases.contains_key(*n)) {
            let address = base_address(name, width);
            for c in base_address_constraints(&address, &right.highest_allocated_addresses, width)? {
                right_constraints.add(c);
            }
        }
        for name in right.bases.keys().filter(|n| !left.bases.contains_key(*n)) {
            let address = base_address(name, width);
            for c in base_address_constraints(&address, &left.highest_allocated_addresses, width)? {
                left_constraints.add(c);
            }
        }

        let fields = left.fields.clone().union(right.fields.clone());
        let targets = left
            .targets
            .clone()
            .union_with(right.targets.clone(), OrdSet::union);

        let mut highest = left.highest_allocated_addresses.clone();
        highest.append(right.highest_allocated_addresses.clone());
        let highest = dedup_terms(&highest);

        let deferred_allocations = merge_deferred_allocations(
            &left.deferred_allocations,
            &right.deferred_allocations,
            &bases,
        );

        // a base only has all its targets on a side where it is actual and
        // every merged field is tracked
        let incomplete: Vec<String> = bases
            .iter()
            .filter(|(_, ty)| !ty.is_fake_base())
            .map(|(name, _)| name)
            .filter(|name| {
                ![left, right].iter().any(|side| {
                    side.is_actual_base(name) && side.fields.len() == fields.len()
                })
            })
            .cloned()
            .collect();

        let merged = PointerTargetSet {
            bases,
            fields,
            deferred_allocations,
            targets,
            highest_allocated_addresses: highest,
            allocation_count: left.allocation_count.max(right.allocation_count),
        };
        let pts = if incomplete.is_empty() {
            merged
        } else {
            let mut builder =
                merged.builder(Arc::clone(&self.config), Arc::clone(&self.regions));
            for name in &incomplete {
                trace!(base = name.as_str(), "completing targets after merge");
                builder.complete_base_targets(name)?;
            }
            builder.build()
        };
        debug!(
            bases = pts.bases.len(),
            deferred = pts.deferred_allocations.len(),
            completed = incomplete.len(),
            left_constraints = left_constraints.len(),
            right_constraints = right_constraints.len(),
            "merged pointer target sets"
        );
        Ok(MergeResult {
            pts,
            left_constraints,
            right_constraints,
        })
    }
}

fn merge_bases(
    left: &OrdMap<String, CType>,
    right: &OrdMap<String, CType>,
) -> EncodingResult<OrdMap<String, CType>> {
    let mut bases = left.clone();
    for (name, r) in right.iter() {
        match left.get(name) {
            None => {
                bases.insert(name.clone(), r.clone());
            }
            Some(l) if l == r => {}
            // sizes of the same allocation site differ between the paths
            Some(l) if l.is_fake_base() && r.is_fake_base() => {
                bases.insert(name.clone(), CType::fake_base(None));
            }
            Some(l) if l.is_fake_base() => {
                bases.insert(name.clone(), r.clone());
            }
            Some(_) if r.is_fake_base() => {}
            Some(l) => {
                return Err(EncodingError::InvariantViolation(format!(
                    "base {name} has type {l} on one path and {r} on the other"
                )))
            }
        }
    }
    Ok(bases)
}

/// Variable a pool is reachable through
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PoolKey {
    Pointer(String),
    Base(String),
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Pools that share a pointer or base variable on either side end up in
/// one pool. Bases that became actual on one of the paths leave their
/// pools, and pools left without bases are dropped.
fn merge_deferred_allocations(
    left: &OrdMap<String, Arc<DeferredAllocationPool>>,
    right: &OrdMap<String, Arc<DeferredAllocationPool>>,
    bases: &OrdMap<String, CType>,
) -> OrdMap<String, Arc<DeferredAllocationPool>> {
    let pools: Vec<&Arc<DeferredAllocationPool>> = left.values().chain(right.values()).collect();
    let mut parent: Vec<usize> = (0..pools.len()).collect();
    let mut owner: OrdMap<PoolKey, usize> = OrdMap::new();
    for (i, pool) in pools.iter().enumerate() {
        let keys = pool
            .pointer_variables()
            .iter()
            .map(|p| PoolKey::Pointer(p.clone()))
            .chain(pool.base_variables().iter().map(|b| PoolKey::Base(b.clone())));
        for key in keys {
            match owner.get(&key).copied() {
                Some(j) => {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    parent[a] = b;
                }
                None => {
                    owner.insert(key, i);
                }
            }
        }
    }

    let mut components: BTreeMap<usize, DeferredAllocationPool> = BTreeMap::new();
    for (i, pool) in pools.iter().enumerate() {
        let root = find(&mut parent, i);
        let joined = match components.remove(&root) {
            Some(component) => component.merge(pool),
            None => DeferredAllocationPool::clone(pool),
        };
        components.insert(root, joined);
    }

    let is_actual = |base: &str| bases.get(base).is_some_and(|ty| !ty.is_fake_base());
    let mut merged = OrdMap::new();
    for pool in components.into_values() {
        let pool = pool.without_bases(is_actual);
        if pool.base_variables().is_empty() {
            trace!(pointers = pool.pointer_variables().len(), "dropping resolved pool");
            continue;
        }
        let pool = Arc::new(pool);
        for pointer in pool.pointer_variables().iter() {
            merged.insert(pointer.clone(), Arc::clone(&pool));
        }
    }
    merged
}

/// First occurrences only, in order
fn dedup_terms(terms: &Vector<Term>) -> Vector<Term> {
    let mut out = Vector::new();
    for t in terms.iter() {
        if !out.contains(t) {
            out.push_back(t.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer_target_set::PointerTargetSetBuilder;
    use crate::region::DefaultRegionManager;
    use crate::target::PointerTarget;
    use c2smt_types::StructField;

    fn config() -> Arc<PointerAliasingConfig> {
        Arc::new(PointerAliasingConfig::default())
    }

    fn builder(pts: &PointerTargetSet) -> PointerTargetSetBuilder {
        pts.builder(config(), Arc::new(DefaultRegionManager::new()))
    }

    fn merger() -> PointerTargetSetMerger {
        PointerTargetSetMerger::new(config(), Arc::new(DefaultRegionManager::new()))
    }

    #[test]
    fn test_merge_with_self_is_identity() {
        let mut b = builder(&PointerTargetSet::empty());
        let mut c = Constraints::new();
        b.make_allocation("a", &CType::array(CType::int(), 4), Term::bv(16, 64), &mut c)
            .unwrap();
        b.prepare_base("m#2", Some(8));
        b.start_deferred_allocation("p", "m#2", Some(8), false);
        let s = b.build();
        let merged = merger().merge(&s, &s).unwrap();
        assert_eq!(merged.pts, s);
        assert_eq!(merged.pts.targets(), s.targets());
        assert!(merged.left_constraints.is_empty());
        assert!(merged.right_constraints.is_empty());
    }

    #[test]
    fn test_fake_base_yields_to_actual() {
        let mut l = builder(&PointerTargetSet::empty());
        l.prepare_base("m#1", Some(4));
        let mut r = l.clone();
        r.share_base("m#1", &CType::int()).unwrap();
        let merged = merger().merge(&l.build(), &r.build()).unwrap();
        assert!(merged.pts.is_actual_base("m#1"));
        assert_eq!(merged.pts.all_targets("*int").len(), 1);
    }

    #[test]
    fn test_conflicting_bases_are_rejected() {
        let mut l = builder(&PointerTargetSet::empty());
        let mut r = l.clone();
        l.add_base("x", &CType::int()).unwrap();
        r.add_base("x", &CType::long()).unwrap();
        let err = merger().merge(&l.build(), &r.build()).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_one_sided_bases_get_constraints() {
        let root = PointerTargetSet::empty();
        let mut l = builder(&root);
        let mut c = Constraints::new();
        l.make_allocation("a", &CType::int(), Term::bv(4, 64), &mut c)
            .unwrap();
        let r = builder(&root);
        let merged = merger().merge(&l.build(), &r.build()).unwrap();
        assert!(merged.left_constraints.is_empty());
        assert_eq!(merged.right_constraints.len(), 1);
        assert_eq!(merged.pts.highest_allocated_addresses().len(), 1);
    }

    #[test]
    fn test_targets_union() {
        let s = CType::structure(
            "S",
            vec![
                StructField::new("f", CType::int()),
                StructField::new("g", CType::int()),
            ],
        );
        let mut root = builder(&PointerTargetSet::empty());
        root.add_base("s", &s).unwrap();
        let root = root.build();
        let mut l = builder(&root);
        l.add_field(&s, "f").unwrap();
        let mut r = builder(&root);
        r.add_field(&s, "g").unwrap();
        let merged = merger().merge(&l.build(), &r.build()).unwrap();
        assert_eq!(merged.pts.all_targets("*int").len(), 2);
        assert_eq!(merged.pts.fields().len(), 2);
    }

    fn s_type() -> CType {
        CType::structure(
            "S",
            vec![
                StructField::new("f", CType::int()),
                StructField::new("g", CType::long()),
            ],
        )
    }

    #[test]
    fn test_fields_reach_bases_of_the_other_path() {
        let root = PointerTargetSet::empty();
        let mut l = builder(&root);
        l.add_field(&s_type(), "f").unwrap();
        let mut r = builder(&root);
        r.add_base("s", &s_type()).unwrap();
        let merged = merger().merge(&l.build(), &r.build()).unwrap().pts;

        let mut sequential = builder(&root);
        sequential.add_field(&s_type(), "f").unwrap();
        sequential.add_base("s", &s_type()).unwrap();
        let sequential = sequential.build();
        assert_eq!(merged, sequential);
        assert_eq!(merged.all_targets("*int"), sequential.all_targets("*int"));
        assert_eq!(
            merged.all_targets("*int").into_iter().collect::<Vec<_>>(),
            vec![PointerTarget::new("s", Some(s_type()), 0, 0)]
        );
    }

    #[test]
    fn test_shared_base_gets_fields_of_the_other_path() {
        let mut root = builder(&PointerTargetSet::empty());
        root.prepare_base("m#1", Some(16));
        let root = root.build();
        let mut l = builder(&root);
        l.add_field(&s_type(), "g").unwrap();
        let mut r = builder(&root);
        r.share_base("m#1", &s_type()).unwrap();
        assert!(r.all_targets("*long").is_empty());

        let merged = merger().merge(&l.build(), &r.build()).unwrap().pts;
        assert!(merged.is_actual_base("m#1"));
        assert_eq!(
            merged.all_targets("*long").into_iter().collect::<Vec<_>>(),
            vec![PointerTarget::new("m#1", Some(s_type()), 8, 0)]
        );
    }

    #[test]
    fn test_pool_resolved_on_one_path_is_dropped() {
        let mut root = builder(&PointerTargetSet::empty());
        root.prepare_base("m#1", Some(16));
        root.start_deferred_allocation("p", "m#1", Some(16), false);
        let root = root.build();
        let mut l = builder(&root);
        l.resolve_deferred_pointer("p", &s_type()).unwrap();
        let r = builder(&root);

        let merged = merger().merge(&l.build(), &r.build()).unwrap().pts;
        assert_eq!(merged.bases().get("m#1"), Some(&s_type()));
        assert!(!merged.is_deferred_allocation_pointer("p"));

        // a later cast of p to another type leaves the base alone
        let mut after = builder(&merged);
        assert_eq!(after.resolve_deferred_pointer("p", &CType::char()).unwrap(), None);
        assert_eq!(after.base_type("m#1"), Some(&s_type()));
    }

    #[test]
    fn test_pools_join_transitively() {
        let mut root = builder(&PointerTargetSet::empty());
        for base in ["a#1", "a#2", "a#3"] {
            root.prepare_base(base, Some(8));
        }
        let root = root.build();
        let mut l = builder(&root);
        l.start_deferred_allocation("p", "a#1", Some(8), false);
        l.start_deferred_allocation("q", "a#2", Some(8), false);
        let mut r = builder(&root);
        r.start_deferred_allocation("p", "a#3", Some(8), false);
        r.add_deferred_pointer("q", "p").unwrap();

        let merged = merger().merge(&l.build(), &r.build()).unwrap().pts;
        let pool = merged.deferred_pool("p").unwrap();
        assert_eq!(merged.deferred_pool("q"), Some(pool));
        assert_eq!(pool.base_variables().len(), 3);
        assert_eq!(pool.size(), Some(8));
    }

    #[test]
    fn test_highest_addresses_concatenate() {
        let root = PointerTargetSet::empty();
        let mut l = builder(&root);
        let mut r = builder(&root);
        let mut c = Constraints::new();
        l.make_allocation("a", &CType::int(), Term::bv(4, 64), &mut c)
            .unwrap();
        r.make_allocation("b", &CType::int(), Term::bv(4, 64), &mut c)
            .unwrap();
        let merged = merger().merge(&l.build(), &r.build()).unwrap();
        let highest = merged.pts.highest_allocated_addresses();
        assert_eq!(highest.len(), 2);
        assert_eq!(dedup_terms(highest), highest.clone());
    }
}
