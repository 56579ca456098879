//! The pointer target set: the memory model of one program point
//!
//! A [`PointerTargetSet`] is an immutable snapshot built on persistent maps.
//! All changes go through a [`PointerTargetSetBuilder`], which shares
//! structure with the snapshot it was created from, so branching paths can
//! keep and extend a common ancestor without copying it.

use crate::config::PointerAliasingConfig;
use crate::deferred::{DeferredAllocation, DeferredAllocationPool};
use crate::error::{EncodingError, EncodingResult};
use crate::pattern::TargetMatcher;
use crate::region::{MemoryRegion, MemoryRegionManager};
use crate::ssa::Constraints;
use crate::target::{base_address, CompositeField, PointerTarget};
use c2smt_formula::Term;
use c2smt_types::{check_simplified, CType};
use im::{OrdMap, OrdSet, Vector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// Immutable memory-model snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointerTargetSet {
    pub(crate) bases: OrdMap<String, CType>,
    pub(crate) fields: OrdMap<CompositeField, bool>,
    pub(crate) deferred_allocations: OrdMap<String, Arc<DeferredAllocationPool>>,
    pub(crate) targets: OrdMap<String, OrdSet<PointerTarget>>,
    pub(crate) highest_allocated_addresses: Vector<Term>,
    pub(crate) allocation_count: u64,
}

/// Targets are derived from bases and fields and do not take part in
/// equality.
impl PartialEq for PointerTargetSet {
    fn eq(&self, other: &Self) -> bool {
        self.bases == other.bases
            && self.fields == other.fields
            && self.deferred_allocations == other.deferred_allocations
            && self.highest_allocated_addresses == other.highest_allocated_addresses
            && self.allocation_count == other.allocation_count
    }
}

impl Eq for PointerTargetSet {}

impl PointerTargetSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bases(&self) -> &OrdMap<String, CType> {
        &self.bases
    }

    pub fn fields(&self) -> &OrdMap<CompositeField, bool> {
        &self.fields
    }

    pub fn deferred_allocations(&self) -> &OrdMap<String, Arc<DeferredAllocationPool>> {
        &self.deferred_allocations
    }

    pub fn targets(&self) -> &OrdMap<String, OrdSet<PointerTarget>> {
        &self.targets
    }

    /// Targets of region `symbol` (empty if the region has none)
    pub fn all_targets(&self, symbol: &str) -> OrdSet<PointerTarget> {
        self.targets.get(symbol).cloned().unwrap_or_default()
    }

    pub fn highest_allocated_addresses(&self) -> &Vector<Term> {
        &self.highest_allocated_addresses
    }

    pub fn allocation_count(&self) -> u64 {
        self.allocation_count
    }

    /// No bases, fields or deferred allocations
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty() && self.fields.is_empty() && self.deferred_allocations.is_empty()
    }

    pub fn is_base(&self, name: &str) -> bool {
        self.bases.contains_key(name)
    }

    /// A base with a known type
    pub fn is_actual_base(&self, name: &str) -> bool {
        self.bases.get(name).is_some_and(|ty| !ty.is_fake_base())
    }

    /// A base whose address is known but whose type is not
    pub fn is_prepared_base(&self, name: &str) -> bool {
        self.bases.get(name).is_some_and(CType::is_fake_base)
    }

    pub fn tracks_field(&self, field: &CompositeField) -> bool {
        self.fields.contains_key(field)
    }

    pub fn deferred_pool(&self, pointer: &str) -> Option<&Arc<DeferredAllocationPool>> {
        self.deferred_allocations.get(pointer)
    }

    pub fn is_deferred_allocation_pointer(&self, pointer: &str) -> bool {
        self.deferred_allocations.contains_key(pointer)
    }

    /// Targets of region `symbol` matched by `matcher`
    pub fn matching_targets(&self, symbol: &str, matcher: &impl TargetMatcher) -> Vec<PointerTarget> {
        self.targets
            .get(symbol)
            .map(|ts| ts.iter().filter(|t| matcher.matches(t)).cloned().collect())
            .unwrap_or_default()
    }

    /// Targets of region `symbol` not matched by `matcher`
    pub fn non_matching_targets(
        &self,
        symbol: &str,
        matcher: &impl TargetMatcher,
    ) -> Vec<PointerTarget> {
        self.targets
            .get(symbol)
            .map(|ts| ts.iter().filter(|t| !matcher.matches(t)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn builder(
        &self,
        config: Arc<PointerAliasingConfig>,
        regions: Arc<dyn MemoryRegionManager>,
    ) -> PointerTargetSetBuilder {
        PointerTargetSetBuilder {
            bases: self.bases.clone(),
            fields: self.fields.clone(),
            deferred_allocations: self.deferred_allocations.clone(),
            targets: self.targets.clone(),
            highest_allocated_addresses: self.highest_allocated_addresses.clone(),
            allocation_count: self.allocation_count,
            config,
            regions,
        }
    }
}

/// Accumulates changes to a snapshot
#[derive(Debug, Clone)]
pub struct PointerTargetSetBuilder {
    bases: OrdMap<String, CType>,
    fields: OrdMap<CompositeField, bool>,
    deferred_allocations: OrdMap<String, Arc<DeferredAllocationPool>>,
    targets: OrdMap<String, OrdSet<PointerTarget>>,
    highest_allocated_addresses: Vector<Term>,
    allocation_count: u64,
    config: Arc<PointerAliasingConfig>,
    regions: Arc<dyn MemoryRegionManager>,
}

impl PointerTargetSetBuilder {
    pub fn config(&self) -> &PointerAliasingConfig {
        &self.config
    }

    pub fn regions(&self) -> &Arc<dyn MemoryRegionManager> {
        &self.regions
    }

    pub fn base_type(&self, name: &str) -> Option<&CType> {
        self.bases.get(name)
    }

    pub fn is_actual_base(&self, name: &str) -> bool {
        self.bases.get(name).is_some_and(|ty| !ty.is_fake_base())
    }

    pub fn is_prepared_base(&self, name: &str) -> bool {
        self.bases.get(name).is_some_and(CType::is_fake_base)
    }

    pub fn tracks_field(&self, field: &CompositeField) -> bool {
        self.fields.contains_key(field)
    }

    pub fn all_targets(&self, symbol: &str) -> OrdSet<PointerTarget> {
        self.targets.get(symbol).cloned().unwrap_or_default()
    }

    /// Region symbols that have targets
    pub fn target_symbols(&self) -> impl Iterator<Item = &String> {
        self.targets.keys()
    }

    pub fn deferred_pool(&self, pointer: &str) -> Option<Arc<DeferredAllocationPool>> {
        self.deferred_allocations.get(pointer).cloned()
    }

    pub fn highest_allocated_addresses(&self) -> &Vector<Term> {
        &self.highest_allocated_addresses
    }

    pub fn allocation_count(&self) -> u64 {
        self.allocation_count
    }

    /// Register base `name` of type `ty` and materialise its targets.
    ///
    /// Returns whether the base is new. Re-adding with the same type is a
    /// no-op; a different type is an invariant violation.
    pub fn add_base(&mut self, name: &str, ty: &CType) -> EncodingResult<bool> {
        let ty = check_simplified(ty)?;
        if let Some(existing) = self.bases.get(name) {
            if existing == ty {
                return Ok(false);
            }
            return Err(EncodingError::InvariantViolation(format!(
                "base {name} already has type {existing}, cannot add it as {ty}"
            )));
        }
        debug!(base = name, ty = %ty, "adding base");
        self.bases.insert(name.to_string(), ty.clone());
        self.add_to_targets(name, None, ty, None, 0, 0)?;
        Ok(true)
    }

    /// Register a fake base of `size` bytes whose type is not known yet
    pub fn prepare_base(&mut self, name: &str, size: Option<u64>) -> bool {
        if self.bases.contains_key(name) {
            return false;
        }
        trace!(base = name, ?size, "preparing fake base");
        let size = size.and_then(|s| usize::try_from(s).ok());
        self.bases
            .insert(name.to_string(), CType::fake_base(size));
        true
    }

    /// Turn a fake base into an actual one of type `ty`
    pub fn share_base(&mut self, name: &str, ty: &CType) -> EncodingResult<()> {
        let ty = check_simplified(ty)?;
        match self.bases.get(name) {
            Some(existing) if existing.is_fake_base() => {
                debug!(base = name, ty = %ty, "sharing prepared base");
                self.bases.insert(name.to_string(), ty.clone());
                self.add_to_targets(name, None, ty, None, 0, 0)
            }
            Some(existing) if existing == ty => Ok(()),
            Some(existing) => Err(EncodingError::InvariantViolation(format!(
                "cannot share base {name} of type {existing} as {ty}"
            ))),
            None => self.add_base(name, ty).map(|_| ()),
        }
    }

    /// Add `target` to region `symbol` unless it is already there
    pub fn add_target(&mut self, symbol: &str, target: PointerTarget) -> bool {
        let set = self.targets.get(symbol).cloned().unwrap_or_default();
        if set.contains(&target) {
            return false;
        }
        trace!(region = symbol, %target, "adding target");
        self.targets.insert(symbol.to_string(), set.update(target));
        true
    }

    /// Materialise every target of the actual base `name` under the
    /// currently tracked fields. Targets already present are kept.
    pub(crate) fn complete_base_targets(&mut self, name: &str) -> EncodingResult<()> {
        match self.bases.get(name) {
            Some(ty) if !ty.is_fake_base() => {
                let ty = ty.clone();
                self.add_to_targets(name, None, &ty, None, 0, 0)
            }
            _ => Ok(()),
        }
    }

    fn add_to_targets(
        &mut self,
        base: &str,
        region: Option<MemoryRegion>,
        current: &CType,
        container: Option<&CType>,
        proper_offset: u64,
        container_offset: u64,
    ) -> EncodingResult<()> {
        match current {
            CType::Array(elem, _) => {
                let length = self.config.tracked_array_length(current) as u64;
                let elem_size = elem.size() as u64;
                for i in 0..length {
                    self.add_to_targets(
                        base,
                        None,
                        elem,
                        Some(current),
                        i * elem_size,
                        container_offset + proper_offset,
                    )?;
                }
            }
            CType::Struct { .. } | CType::Union { .. } => {
                for field in current.fields() {
                    if !self
                        .fields
                        .contains_key(&CompositeField::new(current, &field.name))
                    {
                        continue;
                    }
                    let region =
                        self.regions
                            .make_memory_region_for_field(current, &field.ty, &field.name)?;
                    let offset = current.field_offset(&field.name).unwrap_or(0) as u64;
                    self.add_to_targets(
                        base,
                        Some(region),
                        &field.ty,
                        Some(current),
                        offset,
                        container_offset + proper_offset,
                    )?;
                }
            }
            ty if ty.is_scalar() => {
                let region = match region {
                    Some(region) => region,
                    None => self.regions.make_memory_region(ty)?,
                };
                let symbol = self.regions.pointer_access_name(&region);
                self.add_target(
                    &symbol,
                    PointerTarget::new(base, container.cloned(), proper_offset, container_offset),
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Track `field_name` of `composite` individually and add its targets
    /// in every existing base. Returns whether the field is new.
    pub fn add_field(&mut self, composite: &CType, field_name: &str) -> EncodingResult<bool> {
        let composite = check_simplified(composite)?;
        if composite.get_field(field_name).is_none() {
            return Err(EncodingError::UnrecognizedCode(format!(
                "{composite} has no field {field_name}"
            )));
        }
        let field = CompositeField::new(composite, field_name);
        if self.fields.contains_key(&field) {
            return Ok(false);
        }
        debug!(%field, "tracking field");
        let bases: Vec<(String, CType)> = self
            .bases
            .iter()
            .filter(|(_, ty)| !ty.is_fake_base())
            .map(|(n, t)| (n.clone(), t.clone()))
            .collect();
        for (base, ty) in &bases {
            self.add_field_targets(base, ty, 0, 0, composite, field_name)?;
        }
        self.fields.insert(field, true);
        Ok(true)
    }

    fn add_field_targets(
        &mut self,
        base: &str,
        current: &CType,
        proper_offset: u64,
        container_offset: u64,
        composite: &CType,
        field_name: &str,
    ) -> EncodingResult<()> {
        match current {
            CType::Array(elem, _) => {
                let length = self.config.tracked_array_length(current) as u64;
                let elem_size = elem.size() as u64;
                for i in 0..length {
                    self.add_field_targets(
                        base,
                        elem,
                        i * elem_size,
                        container_offset + proper_offset,
                        composite,
                        field_name,
                    )?;
                }
            }
            CType::Struct { .. } | CType::Union { .. } => {
                for field in current.fields() {
                    let offset = current.field_offset(&field.name).unwrap_or(0) as u64;
                    if current == composite && field.name == field_name {
                        let region = self.regions.make_memory_region_for_field(
                            current,
                            &field.ty,
                            &field.name,
                        )?;
                        self.add_to_targets(
                            base,
                            Some(region),
                            &field.ty,
                            Some(current),
                            offset,
                            container_offset + proper_offset,
                        )?;
                    } else if self
                        .fields
                        .contains_key(&CompositeField::new(current, &field.name))
                    {
                        self.add_field_targets(
                            base,
                            &field.ty,
                            offset,
                            container_offset + proper_offset,
                            composite,
                            field_name,
                        )?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn install_pool(&mut self, pool: Arc<DeferredAllocationPool>) {
        for pointer in pool.pointer_variables().iter() {
            self.deferred_allocations
                .insert(pointer.clone(), Arc::clone(&pool));
        }
    }

    /// Track a new untyped allocation `base` pointed to by `pointer`
    pub fn start_deferred_allocation(
        &mut self,
        pointer: &str,
        base: &str,
        size: Option<u64>,
        zeroed: bool,
    ) -> Arc<DeferredAllocationPool> {
        self.remove_deferred_pointer(pointer);
        debug!(pointer, base, ?size, zeroed, "starting deferred allocation");
        let pool = Arc::new(DeferredAllocationPool::new(pointer, base, size, zeroed));
        self.install_pool(Arc::clone(&pool));
        pool
    }

    /// Let `new_pointer` share the pool of `existing_pointer`
    pub fn add_deferred_pointer(
        &mut self,
        new_pointer: &str,
        existing_pointer: &str,
    ) -> Option<Arc<DeferredAllocationPool>> {
        if new_pointer == existing_pointer {
            return self.deferred_pool(existing_pointer);
        }
        self.remove_deferred_pointer(new_pointer);
        let pool = self.deferred_allocations.get(existing_pointer)?;
        trace!(new_pointer, existing_pointer, "sharing deferred allocation");
        let pool = Arc::new(pool.with_pointer(new_pointer));
        self.install_pool(Arc::clone(&pool));
        Some(pool)
    }

    /// Detach `pointer` from its pool. The returned pool no longer
    /// contains it but keeps its base variables.
    pub fn remove_deferred_pointer(&mut self, pointer: &str) -> Option<Arc<DeferredAllocationPool>> {
        let pool = self.deferred_allocations.remove(pointer)?;
        trace!(pointer, "removing deferred pointer");
        let pool = Arc::new(pool.without_pointer(pointer));
        self.install_pool(Arc::clone(&pool));
        Some(pool)
    }

    /// Merge two pools and make all their pointers refer to the result
    pub fn merge_deferred_pools(
        &mut self,
        a: &DeferredAllocationPool,
        b: &DeferredAllocationPool,
    ) -> Arc<DeferredAllocationPool> {
        let merged = Arc::new(a.merge(b));
        self.install_pool(Arc::clone(&merged));
        merged
    }

    /// Give every base of `pool` the type `revealed` (or an array of it if
    /// the literal allocation size holds several elements) and stop
    /// deferring it. Returns the resolved allocations.
    pub fn resolve_deferred_allocation(
        &mut self,
        pool: &DeferredAllocationPool,
        revealed: &CType,
    ) -> EncodingResult<Vec<DeferredAllocation>> {
        let revealed = check_simplified(revealed)?;
        let ty = allocation_type(revealed, pool.size());
        for pointer in pool.pointer_variables().iter() {
            self.deferred_allocations.remove(pointer);
        }
        let allocations = pool.allocations();
        for allocation in &allocations {
            debug!(base = %allocation.base, ty = %ty, "resolving deferred allocation");
            self.share_base(&allocation.base, &ty)?;
            self.bump_allocation_counter();
        }
        Ok(allocations)
    }

    /// Resolve the pool `pointer` belongs to, if any
    pub fn resolve_deferred_pointer(
        &mut self,
        pointer: &str,
        revealed: &CType,
    ) -> EncodingResult<Option<Vec<DeferredAllocation>>> {
        match self.deferred_pool(pointer) {
            Some(pool) => self.resolve_deferred_allocation(&pool, revealed).map(Some),
            None => Ok(None),
        }
    }

    pub fn bump_allocation_counter(&mut self) -> u64 {
        self.allocation_count += 1;
        self.allocation_count
    }

    /// Unique base name for an allocation made at `prefix`
    pub fn fresh_base_name(&mut self, prefix: &str) -> String {
        let count = self.bump_allocation_counter();
        format!("{prefix}#{count}")
    }

    /// Register the allocated object `base` of `size` bytes and constrain its
    /// address to lie above every allocated object so far. A fake base type
    /// prepares the base without targets.
    pub fn make_allocation(
        &mut self,
        base: &str,
        ty: &CType,
        size: Term,
        constraints: &mut Constraints,
    ) -> EncodingResult<()> {
        if ty.is_fake_base() {
            self.prepare_base(base, u64::try_from(ty.size()).ok().filter(|s| *s > 0));
        } else {
            self.share_base(base, ty)?;
        }
        let width = self.config.pointer_width;
        let address = base_address(base, width);
        for c in base_address_constraints(&address, &self.highest_allocated_addresses, width)? {
            constraints.add(c);
        }
        let size = match size.as_bv() {
            Some((0, _)) => Term::bv(1, width),
            _ => size,
        };
        let last = Term::bv_sub(Term::bv_add(address, size)?, Term::bv(1, width))?;
        trace!(base, last = %last, "new highest allocated address");
        self.highest_allocated_addresses = Vector::unit(last);
        Ok(())
    }

    pub fn build(self) -> PointerTargetSet {
        PointerTargetSet {
            bases: self.bases,
            fields: self.fields,
            deferred_allocations: self.deferred_allocations,
            targets: self.targets,
            highest_allocated_addresses: self.highest_allocated_addresses,
            allocation_count: self.allocation_count,
        }
    }
}

/// `address > 0` and `address > h` for every highest allocated address `h`
pub(crate) fn base_address_constraints(
    address: &Term,
    highest: &Vector<Term>,
    width: u32,
) -> EncodingResult<Vec<Term>> {
    let mut out = vec![Term::greater_than(address.clone(), Term::bv(0, width), false)?];
    for h in highest.iter() {
        out.push(Term::greater_than(address.clone(), h.clone(), false)?);
    }
    Ok(out)
}

/// Type of an allocation of `size` bytes revealed to hold `revealed` values
pub fn allocation_type(revealed: &CType, size: Option<u64>) -> CType {
    let elem_size = revealed.size() as u64;
    match size {
        Some(size) if elem_size > 0 && size > elem_size && size % elem_size == 0 => {
            CType::array(revealed.clone(), (size / elem_size) as usize)
        }
        _ => revealed.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PointerTargetPattern;
    use crate::region::DefaultRegionManager;
    use c2smt_types::StructField;

    fn builder() -> PointerTargetSetBuilder {
        PointerTargetSet::empty().builder(
            Arc::new(PointerAliasingConfig::default()),
            Arc::new(DefaultRegionManager::new()),
        )
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
    fn test_array_base_targets() {
        let mut b = builder();
        let arr = CType::array(CType::int(), 3);
        assert!(b.add_base("a", &arr).unwrap());
        assert!(!b.add_base("a", &arr).unwrap());
        let pts = b.build();
        let targets = pts.all_targets("*int");
        assert_eq!(targets.len(), 3);
        assert_eq!(
            targets.iter().nth(2),
            Some(&PointerTarget::new("a", Some(arr), 8, 0))
        );
    }

    #[test]
    fn test_conflicting_base_type() {
        let mut b = builder();
        b.add_base("x", &CType::int()).unwrap();
        let err = b.add_base("x", &CType::long()).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_struct_targets_only_for_tracked_fields() {
        let mut b = builder();
        b.add_base("s", &s_type()).unwrap();
        assert!(b.all_targets("*long").is_empty());
        assert!(b.add_field(&s_type(), "g").unwrap());
        assert!(!b.add_field(&s_type(), "g").unwrap());
        assert_eq!(
            b.all_targets("*long").into_iter().collect::<Vec<_>>(),
            vec![PointerTarget::new("s", Some(s_type()), 8, 0)]
        );
        // bases added later see the tracked field directly
        b.add_base("t", &CType::array(s_type(), 2)).unwrap();
        let longs = b.all_targets("*long");
        assert_eq!(longs.len(), 3);
        assert!(longs.contains(&PointerTarget::new("t", Some(s_type()), 8, 16)));
        assert!(b.all_targets("*int").is_empty());
    }

    #[test]
    fn test_completing_a_base_adds_no_duplicates() {
        let mut b = builder();
        let arr = CType::array(CType::int(), 100);
        b.add_base("a", &arr).unwrap();
        b.complete_base_targets("a").unwrap();
        b.complete_base_targets("missing").unwrap();
        let targets = b.all_targets("*int");
        assert_eq!(targets.len(), 100);
        assert_eq!(
            targets.iter().map(PointerTarget::offset).collect::<Vec<_>>(),
            (0..100).map(|i| 4 * i).collect::<Vec<u64>>()
        );
    }

    #[test]
    fn test_add_target_is_idempotent() {
        let mut b = builder();
        let t = PointerTarget::new("x", None, 0, 0);
        assert!(b.add_target("*int", t.clone()));
        assert!(!b.add_target("*int", t));
        assert_eq!(b.all_targets("*int").len(), 1);
    }

    #[test]
    fn test_prepare_and_share_base() {
        let mut b = builder();
        assert!(b.prepare_base("m#1", Some(8)));
        let pts = b.clone().build();
        assert!(pts.is_prepared_base("m#1"));
        assert!(!pts.is_actual_base("m#1"));
        b.share_base("m#1", &CType::array(CType::int(), 2)).unwrap();
        let pts = b.build();
        assert!(pts.is_actual_base("m#1"));
        assert_eq!(pts.all_targets("*int").len(), 2);
    }

    #[test]
    fn test_deferred_lifecycle() {
        let mut b = builder();
        b.prepare_base("m#1", Some(16));
        b.start_deferred_allocation("p", "m#1", Some(16), false);
        b.add_deferred_pointer("q", "p");
        let pool = b.deferred_pool("q").unwrap();
        assert_eq!(pool.pointer_variables().len(), 2);

        b.remove_deferred_pointer("p");
        assert!(b.deferred_pool("p").is_none());
        assert_eq!(b.deferred_pool("q").unwrap().pointer_variables().len(), 1);

        let resolved = b.resolve_deferred_pointer("q", &CType::int()).unwrap().unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(b.deferred_pool("q").is_none());
        assert_eq!(b.base_type("m#1"), Some(&CType::array(CType::int(), 4)));
        assert_eq!(b.all_targets("*int").len(), 4);
        assert_eq!(b.allocation_count(), 1);
    }

    #[test]
    fn test_make_allocation_constraints() {
        let mut b = builder();
        let mut c = Constraints::new();
        b.make_allocation("a", &CType::int(), Term::bv(4, 64), &mut c)
            .unwrap();
        assert_eq!(c.len(), 1);
        b.make_allocation("b", &CType::long(), Term::bv(8, 64), &mut c)
            .unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(b.highest_allocated_addresses().len(), 1);
        assert_eq!(
            b.highest_allocated_addresses()[0].to_string(),
            "(bvsub (bvadd __ADDRESS_OF_b (_ bv8 64)) (_ bv1 64))"
        );
    }

    #[test]
    fn test_matching_targets() {
        let mut b = builder();
        b.add_base("a", &CType::array(CType::int(), 4)).unwrap();
        b.add_base("x", &CType::int()).unwrap();
        let pts = b.build();
        let in_a = pts.matching_targets("*int", &PointerTargetPattern::for_base("a"));
        assert_eq!(in_a.len(), 4);
        let rest = pts.non_matching_targets("*int", &PointerTargetPattern::for_base("a"));
        assert_eq!(rest, vec![PointerTarget::new("x", None, 0, 0)]);
    }

    #[test]
    fn test_equality_ignores_targets() {
        let a = builder().build();
        let mut b = PointerTargetSet::empty();
        b.targets
            .insert("*int".into(), OrdSet::unit(PointerTarget::new("x", None, 0, 0)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_allocation_type() {
        assert_eq!(
            allocation_type(&CType::int(), Some(12)),
            CType::array(CType::int(), 3)
        );
        assert_eq!(allocation_type(&CType::int(), Some(4)), CType::int());
        assert_eq!(allocation_type(&CType::int(), Some(6)), CType::int());
        assert_eq!(allocation_type(&CType::int(), None), CType::int());
    }
}
