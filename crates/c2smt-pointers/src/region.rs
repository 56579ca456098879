//! Memory regions
//!
//! A region is a partition of the address space backed by one heap symbol.
//! The default manager uses one region per type; the Burstall-Bornat manager
//! additionally gives struct fields that are accessed but never
//! address-taken a region of their own, so that writes through pointers of
//! the field's type cannot alias them.

use crate::config::FieldClassification;
use crate::error::EncodingResult;
use crate::target::{CompositeField, PointerTarget};
use c2smt_types::{check_simplified, CType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::trace;

/// A named partition of the heap
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemoryRegion {
    /// All objects of one type
    Type(CType),
    /// One field of one composite type
    Field {
        owner: CType,
        field_type: CType,
        field_name: String,
    },
}

impl MemoryRegion {
    /// Type of the values stored in this region
    pub fn value_type(&self) -> &CType {
        match self {
            MemoryRegion::Type(ty) => ty,
            MemoryRegion::Field { field_type, .. } => field_type,
        }
    }

    /// Heap symbol of this region: `*<type>` or `*<field type>@<owner>.<field>`
    pub fn symbol(&self) -> String {
        let raw = match self {
            MemoryRegion::Type(ty) => format!("*{ty}"),
            MemoryRegion::Field {
                owner,
                field_type,
                field_name,
            } => format!("*{field_type}@{owner}.{field_name}"),
        };
        raw.replace(' ', "_")
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Creates regions and names their heap symbols
pub trait MemoryRegionManager: Send + Sync + fmt::Debug {
    /// Region holding values of type `ty`
    fn make_memory_region(&self, ty: &CType) -> EncodingResult<MemoryRegion>;

    /// Region holding field `field_name` of composite `owner`
    fn make_memory_region_for_field(
        &self,
        owner: &CType,
        field_type: &CType,
        field_name: &str,
    ) -> EncodingResult<MemoryRegion>;

    /// Heap symbol backing `region`
    fn pointer_access_name(&self, region: &MemoryRegion) -> String {
        region.symbol()
    }

    /// Record that `target` of region `symbol` was used while encoding `edge`
    fn add_target_to_stats(&self, edge: &str, symbol: &str, target: &PointerTarget);

    /// Human-readable statistics report
    fn print_statistics(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Snapshot of the recorded statistics
    fn statistics(&self) -> RegionStatistics;
}

/// Target and usage counters shared by all paths of one analysis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionStatistics {
    targets: BTreeMap<String, BTreeSet<PointerTarget>>,
    usage: BTreeMap<(String, String), usize>,
}

impl RegionStatistics {
    fn record(&mut self, edge: &str, symbol: &str, target: &PointerTarget) {
        self.targets
            .entry(symbol.to_string())
            .or_default()
            .insert(target.clone());
        *self
            .usage
            .entry((edge.to_string(), symbol.to_string()))
            .or_insert(0) += 1;
    }

    /// Number of distinct targets used in region `symbol`
    pub fn target_count(&self, symbol: &str) -> usize {
        self.targets.get(symbol).map_or(0, BTreeSet::len)
    }

    /// How often region `symbol` was used on `edge`
    pub fn usage_count(&self, edge: &str, symbol: &str) -> usize {
        self.usage
            .get(&(edge.to_string(), symbol.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn print(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Memory regions: {}", self.targets.len())?;
        for (symbol, targets) in &self.targets {
            writeln!(out, "  {symbol}: {} targets", targets.len())?;
        }
        writeln!(out, "Region usage per edge:")?;
        for ((edge, symbol), count) in &self.usage {
            writeln!(out, "  {edge}: {symbol} x{count}")?;
        }
        Ok(())
    }
}

/// One region per type
#[derive(Debug, Default)]
pub struct DefaultRegionManager {
    stats: Mutex<RegionStatistics>,
}

impl DefaultRegionManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryRegionManager for DefaultRegionManager {
    fn make_memory_region(&self, ty: &CType) -> EncodingResult<MemoryRegion> {
        Ok(MemoryRegion::Type(check_simplified(ty)?.clone()))
    }

    fn make_memory_region_for_field(
        &self,
        owner: &CType,
        field_type: &CType,
        _field_name: &str,
    ) -> EncodingResult<MemoryRegion> {
        check_simplified(owner)?;
        self.make_memory_region(field_type)
    }

    fn add_target_to_stats(&self, edge: &str, symbol: &str, target: &PointerTarget) {
        self.stats.lock().record(edge, symbol, target);
    }

    fn print_statistics(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.stats.lock().print(out)
    }

    fn statistics(&self) -> RegionStatistics {
        self.stats.lock().clone()
    }
}

/// Burstall-Bornat regions: relevant fields that are never address-taken
/// get a region of their own
#[derive(Debug)]
pub struct BnBRegionManager {
    field_regions: BTreeSet<CompositeField>,
    shared_fields: BTreeSet<CompositeField>,
    stats: Mutex<RegionStatistics>,
}

impl BnBRegionManager {
    pub fn new(classification: &FieldClassification) -> Self {
        let field_regions: BTreeSet<_> =
            classification.field_region_candidates().cloned().collect();
        let shared_fields = classification
            .relevant
            .intersection(&classification.addressed)
            .cloned()
            .collect();
        trace!(
            fields = field_regions.len(),
            "built Burstall-Bornat field partition"
        );
        Self {
            field_regions,
            shared_fields,
            stats: Mutex::new(RegionStatistics::default()),
        }
    }

    /// Whether `field` of `owner` lives in a region of its own
    pub fn has_own_region(&self, owner: &CType, field_name: &str) -> bool {
        self.field_regions
            .contains(&CompositeField::new(owner, field_name))
    }
}

impl MemoryRegionManager for BnBRegionManager {
    fn make_memory_region(&self, ty: &CType) -> EncodingResult<MemoryRegion> {
        Ok(MemoryRegion::Type(check_simplified(ty)?.clone()))
    }

    fn make_memory_region_for_field(
        &self,
        owner: &CType,
        field_type: &CType,
        field_name: &str,
    ) -> EncodingResult<MemoryRegion> {
        let owner = check_simplified(owner)?;
        let field_type = check_simplified(field_type)?;
        if self.has_own_region(owner, field_name) {
            Ok(MemoryRegion::Field {
                owner: owner.clone(),
                field_type: field_type.clone(),
                field_name: field_name.to_string(),
            })
        } else {
            Ok(MemoryRegion::Type(field_type.clone()))
        }
    }

    fn add_target_to_stats(&self, edge: &str, symbol: &str, target: &PointerTarget) {
        self.stats.lock().record(edge, symbol, target);
    }

    fn print_statistics(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.stats.lock().print(out)?;
        writeln!(
            out,
            "Field regions: {} own, {} in type regions",
            self.field_regions.len(),
            self.shared_fields.len()
        )?;
        for field in &self.field_regions {
            writeln!(out, "  {field}")?;
        }
        Ok(())
    }

    fn statistics(&self) -> RegionStatistics {
        self.stats.lock().clone()
    }
}
