//! Writes to variables and heap regions
//!
//! A write to an uninterpreted-function region creates a new function
//! version, so every target of the region that the write cannot touch must
//! be carried over explicitly. Targets matched by an exact pattern are
//! overwritten; targets matched by an inexact pattern keep their value unless
//! their address equals one of the written addresses.

use crate::error::{EncodingError, EncodingResult};
use crate::expression::{Location, Value};
use crate::heap::SmtHeap;
use crate::pattern::{PointerTargetPattern, TargetMatcher};
use crate::pointer_target_set::PointerTargetSetBuilder;
use crate::ssa::SsaMapBuilder;
use crate::target::PointerTarget;
use c2smt_formula::{Sort, Term};
use c2smt_types::CType;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Prefix of the symbols standing for unknown written values
pub const NONDET_PREFIX: &str = "__nondet";

/// One scalar write produced by an assignment
#[derive(Debug, Clone)]
pub struct ScalarWrite {
    pub location: Location,
    /// Footprint of an aliased write
    pub pattern: PointerTargetPattern,
    pub ty: CType,
    /// Value to store, already converted to `ty`
    pub value: Value,
}

/// Formula of an assignment and the targets it may have changed
#[derive(Debug, Clone)]
pub struct AssignmentResult {
    pub formula: Term,
    pub invalidated: Vec<PointerTarget>,
}

struct HeapWrite {
    address: Term,
    value: Term,
    pattern: PointerTargetPattern,
    size: u64,
}

/// Encodes groups of scalar writes made on one edge
pub struct AssignmentEncoder<'a> {
    heap: &'a dyn SmtHeap,
    edge: &'a str,
    pointer_width: u32,
}

impl<'a> AssignmentEncoder<'a> {
    pub fn new(heap: &'a dyn SmtHeap, edge: &'a str, pointer_width: u32) -> Self {
        Self {
            heap,
            edge,
            pointer_width,
        }
    }

    /// Encode `writes` as one step. Variables and regions get fresh SSA
    /// indices in `ssa`.
    pub fn assign(
        &self,
        writes: Vec<ScalarWrite>,
        ssa: &mut SsaMapBuilder,
        pts: &PointerTargetSetBuilder,
    ) -> EncodingResult<AssignmentResult> {
        let mut parts = Vec::new();
        let mut by_region: BTreeMap<String, (Sort, Vec<HeapWrite>)> = BTreeMap::new();

        for write in writes {
            let sort = value_sort(&write.ty, self.pointer_width)?;
            match write.location {
                Location::Unaliased { variable } => {
                    let index = ssa.fresh_versioned(variable.name(), sort.clone());
                    if let Value::Term(value) = write.value {
                        parts.push(Term::eq(Term::ssa_var(variable.name(), index, sort), value)?);
                    }
                }
                Location::Aliased { address, region } => {
                    let region = match region {
                        Some(region) => region,
                        None => pts.regions().make_memory_region(&write.ty)?,
                    };
                    let symbol = pts.regions().pointer_access_name(&region);
                    let value = match write.value {
                        Value::Term(value) => value,
                        Value::Nondet => nondet_value(ssa, &sort),
                    };
                    by_region
                        .entry(symbol)
                        .or_insert_with(|| (sort, Vec::new()))
                        .1
                        .push(HeapWrite {
                            address,
                            value,
                            pattern: write.pattern,
                            size: write.ty.size() as u64,
                        });
                }
            }
        }

        let mut invalidated = Vec::new();
        for (symbol, (sort, writes)) in &by_region {
            parts.push(self.write_region(symbol, sort, writes, ssa, pts, &mut invalidated)?);
        }
        Ok(AssignmentResult {
            formula: Term::and_all(parts),
            invalidated,
        })
    }

    fn write_region(
        &self,
        symbol: &str,
        sort: &Sort,
        writes: &[HeapWrite],
        ssa: &mut SsaMapBuilder,
        pts: &PointerTargetSetBuilder,
        invalidated: &mut Vec<PointerTarget>,
    ) -> EncodingResult<Term> {
        let heap_symbol = self.heap.heap_symbol(symbol);
        let targets = pts.all_targets(symbol);
        for target in targets.iter() {
            if writes.iter().any(|w| w.pattern.matches(target)) {
                pts.regions().add_target_to_stats(self.edge, symbol, target);
                push_unique(invalidated, target);
            }
        }

        if self.heap.retains_unwritten_cells() {
            if self.heap.is_byte_addressed() {
                self.invalidate_byte_ranges(writes, pts, invalidated);
            }
            let mut parts = Vec::with_capacity(writes.len());
            for write in writes {
                let old = ssa.index(&heap_symbol);
                let new = ssa.fresh_versioned(&heap_symbol, sort.clone());
                parts.push(self.heap.make_pointer_assignment(
                    symbol,
                    sort,
                    old,
                    new,
                    &write.address,
                    &write.value,
                )?);
            }
            trace!(edge = self.edge, region = symbol, writes = writes.len(), "heap write");
            return Ok(Term::and_all(parts));
        }

        let old = ssa.index(&heap_symbol);
        let new = ssa.fresh_versioned(&heap_symbol, sort.clone());
        let cells: Vec<(Term, Term)> = writes
            .iter()
            .map(|w| (w.address.clone(), w.value.clone()))
            .collect();
        let mut parts = vec![self
            .heap
            .make_pointer_assignments(symbol, sort, old, new, &cells)?];

        let mut retained = 0usize;
        for target in targets.iter() {
            let matching: Vec<&HeapWrite> =
                writes.iter().filter(|w| w.pattern.matches(target)).collect();
            if matching.iter().any(|w| w.pattern.is_exact()) {
                continue;
            }
            let address = target.address(self.pointer_width)?;
            let retention = Term::eq(
                self.heap
                    .make_indexed_pointer_dereference(symbol, sort, new, &address)?,
                self.heap
                    .make_indexed_pointer_dereference(symbol, sort, old, &address)?,
            )?;
            if matching.is_empty() {
                parts.push(retention);
            } else {
                let mut overwritten = Vec::with_capacity(matching.len());
                for w in &matching {
                    overwritten.push(Term::eq(address.clone(), w.address.clone())?);
                }
                parts.push(Term::or(Term::or_all(overwritten), retention));
            }
            retained += 1;
        }
        debug!(
            edge = self.edge,
            region = symbol,
            writes = writes.len(),
            retained,
            "function heap write"
        );
        Ok(Term::and_all(parts))
    }

    /// On a byte-addressed heap a write also disturbs targets of other
    /// regions that share its bytes.
    fn invalidate_byte_ranges(
        &self,
        writes: &[HeapWrite],
        pts: &PointerTargetSetBuilder,
        invalidated: &mut Vec<PointerTarget>,
    ) {
        for write in writes {
            let (Some(base), Some(offset)) = (write.pattern.base(), write.pattern.offset()) else {
                continue;
            };
            let range = PointerTargetPattern::for_range(base, offset, write.size);
            for symbol in pts.target_symbols() {
                for target in pts.all_targets(symbol).iter() {
                    if range.matches(target) {
                        push_unique(invalidated, target);
                    }
                }
            }
        }
    }
}

fn push_unique(targets: &mut Vec<PointerTarget>, target: &PointerTarget) {
    if !targets.contains(target) {
        targets.push(target.clone());
    }
}

/// Sort of stored values of the scalar type `ty`
pub fn value_sort(ty: &CType, pointer_width: u32) -> EncodingResult<Sort> {
    match ty {
        CType::Pointer(_) | CType::Array(..) => Ok(Sort::BitVec(pointer_width)),
        ty if ty.is_scalar() => Ok(Sort::BitVec(ty.bit_width())),
        other => Err(EncodingError::Unsupported(format!("values of type {other}"))),
    }
}

/// A fresh symbol for an unknown value of `sort`
pub fn nondet_value(ssa: &mut SsaMapBuilder, sort: &Sort) -> Term {
    let name = match sort.bv_width() {
        Some(width) => format!("{NONDET_PREFIX}_bv{width}"),
        None => NONDET_PREFIX.to_string(),
    };
    let index = ssa.fresh_versioned(&name, sort.clone());
    Term::ssa_var(&name, index, sort.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PointerAliasingConfig;
    use crate::expression::Variable;
    use crate::heap::{ArrayHeap, ByteArrayHeap, UfHeap};
    use crate::pointer_target_set::PointerTargetSet;
    use crate::region::{DefaultRegionManager, MemoryRegion};
    use crate::ssa::SsaMap;
    use crate::target::base_address;
    use c2smt_formula::{Model, Value as ModelValue};
    use std::sync::Arc;

    fn pts_with_ints() -> PointerTargetSetBuilder {
        let mut b = PointerTargetSet::empty().builder(
            Arc::new(PointerAliasingConfig::default()),
            Arc::new(DefaultRegionManager::new()),
        );
        b.add_base("x", &CType::int()).unwrap();
        b.add_base("a", &CType::array(CType::int(), 2)).unwrap();
        b
    }

    fn int_write(address: Term, pattern: PointerTargetPattern, value: i128) -> ScalarWrite {
        ScalarWrite {
            location: Location::aliased(address, Some(MemoryRegion::Type(CType::int()))),
            pattern,
            ty: CType::int(),
            value: Value::Term(Term::bv(value, 32)),
        }
    }

    #[test]
    fn test_unaliased_write() {
        let heap = UfHeap::new(Sort::BitVec(64));
        let enc = AssignmentEncoder::new(&heap, "e1", 64);
        let pts = pts_with_ints();
        let mut ssa = SsaMap::empty().builder();
        let write = ScalarWrite {
            location: Location::unaliased(Variable::new("main::y", CType::int())),
            pattern: PointerTargetPattern::any(),
            ty: CType::int(),
            value: Value::Term(Term::bv(7, 32)),
        };
        let result = enc.assign(vec![write], &mut ssa, &pts).unwrap();
        assert_eq!(result.formula.to_string(), "(= |main::y@2| (_ bv7 32))");
        assert!(result.invalidated.is_empty());
        assert_eq!(ssa.sort("main::y"), Some(&Sort::BitVec(32)));
    }

    #[test]
    fn test_exact_write_retains_other_targets() {
        let heap = UfHeap::new(Sort::BitVec(64));
        let enc = AssignmentEncoder::new(&heap, "e1", 64);
        let pts = pts_with_ints();
        let mut ssa = SsaMap::empty().builder();
        let pattern = PointerTargetPattern::for_base_object("x").build();
        let result = enc
            .assign(vec![int_write(base_address("x", 64), pattern, 5)], &mut ssa, &pts)
            .unwrap();
        assert_eq!(result.invalidated, vec![PointerTarget::new("x", None, 0, 0)]);
        assert_eq!(ssa.index("*int"), 2);

        // the two array cells keep their values, x holds 5
        let mut model = Model::completing();
        model.assign_function("*int@1", vec![ModelValue::BitVec(100, 64)], ModelValue::BitVec(9, 32));
        model.assign("__ADDRESS_OF_x", ModelValue::BitVec(64, 64));
        model.assign("__ADDRESS_OF_a", ModelValue::BitVec(100, 64));
        model.define(&result.formula).unwrap();
        let read = heap
            .make_indexed_pointer_dereference("*int", &Sort::BitVec(32), 2, &Term::bv(100, 64))
            .unwrap();
        assert_eq!(model.eval(&read).unwrap().as_bv(), Some((9, 32)));
        let read = heap
            .make_indexed_pointer_dereference("*int", &Sort::BitVec(32), 2, &Term::bv(64, 64))
            .unwrap();
        assert_eq!(model.eval(&read).unwrap().as_bv(), Some((5, 32)));
    }

    #[test]
    fn test_inexact_write_guards_retention() {
        let heap = UfHeap::new(Sort::BitVec(64));
        let enc = AssignmentEncoder::new(&heap, "e1", 64);
        let pts = pts_with_ints();
        let mut ssa = SsaMap::empty().builder();
        let p = Term::var("main::p@1", Sort::BitVec(64));
        let result = enc
            .assign(vec![int_write(p, PointerTargetPattern::any(), 1)], &mut ssa, &pts)
            .unwrap();
        assert_eq!(result.invalidated.len(), 3);
        let text = result.formula.to_string();
        assert!(text.contains("(or (= __ADDRESS_OF_x |main::p@1|)"));
        assert_eq!(pts.regions().statistics().usage_count("e1", "*int"), 3);
    }

    #[test]
    fn test_array_heap_has_no_retention() {
        let heap = ArrayHeap::new(Sort::BitVec(64));
        let enc = AssignmentEncoder::new(&heap, "e1", 64);
        let pts = pts_with_ints();
        let mut ssa = SsaMap::empty().builder();
        let pattern = PointerTargetPattern::for_base_object("x").build();
        let result = enc
            .assign(vec![int_write(base_address("x", 64), pattern, 5)], &mut ssa, &pts)
            .unwrap();
        assert_eq!(
            result.formula.to_string(),
            "(= *int@2 (store *int@1 __ADDRESS_OF_x (_ bv5 32)))"
        );
    }

    #[test]
    fn test_byte_heap_invalidates_overlapping_targets() {
        let heap = ByteArrayHeap::new(
            Sort::BitVec(64),
            crate::config::Endianness::Little,
            crate::config::SubBytePolicy::Reject,
        );
        let enc = AssignmentEncoder::new(&heap, "e1", 64);
        let mut pts = pts_with_ints();
        pts.add_base("c", &CType::array(CType::char(), 8)).unwrap();
        let mut ssa = SsaMap::empty().builder();
        // an int written over bytes 2..6 of c
        let pattern = PointerTargetPattern::for_base_object("c")
            .shift_container(CType::array(CType::char(), 8), 2)
            .build();
        let address = Term::bv_add(base_address("c", 64), Term::bv(2, 64)).unwrap();
        let result = enc
            .assign(vec![int_write(address, pattern, 5)], &mut ssa, &pts)
            .unwrap();
        assert_eq!(result.invalidated.len(), 4);
        assert!(result
            .invalidated
            .iter()
            .all(|t| t.base == "c" && (2..6).contains(&t.offset())));
        assert_eq!(ssa.index("__heap"), 2);
    }

    #[test]
    fn test_nondet_values_are_fresh() {
        let mut ssa = SsaMap::empty().builder();
        let a = nondet_value(&mut ssa, &Sort::BitVec(32));
        let b = nondet_value(&mut ssa, &Sort::BitVec(32));
        assert_ne!(a, b);
        assert_eq!(a.sort(), Sort::BitVec(32));
    }
}
