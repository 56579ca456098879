//! Pointer-aliasing memory model for encoding C programs into SMT
//!
//! Every object whose address may be taken lives in a heap split into
//! memory regions. The memory model of a program point is a
//! [`PointerTargetSet`]: the heap bases with their types, the tracked
//! composite fields, the pointer targets of every region, and the untyped
//! allocations whose type is still unknown.
//!
//! # Architecture
//!
//! - `region`: region managers (one region per type, or Burstall-Bornat
//!   field regions) and usage statistics
//! - `pointer_target_set`, `merge`: snapshots, their builder, and joins
//! - `deferred`: pools of untyped allocations
//! - `heap`: heap encodings over uninterpreted functions, arrays, or a
//!   single byte array
//! - `pattern`: pointer target patterns describing write footprints
//! - `visitor`, `expression`, `evaluator`: evaluation of C expressions to
//!   values and locations
//! - `assignment`: heap writes with retention of untouched targets
//! - `encoder`: edge-level assignments, assumptions and path joins

pub mod assignment;
pub mod config;
pub mod deferred;
pub mod encoder;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod heap;
pub mod merge;
pub mod pattern;
pub mod pointer_target_set;
pub mod region;
pub mod ssa;
pub mod target;
pub mod visitor;

pub use assignment::{AssignmentEncoder, AssignmentResult, ScalarWrite};
pub use config::{
    Endianness, FieldClassification, HeapEncoding, PointerAliasingConfig, SubBytePolicy,
};
pub use deferred::{DeferredAllocation, DeferredAllocationPool};
pub use encoder::{EncodedEdge, MergedStates, PathState, PointerAliasingEncoder};
pub use error::{EncodingError, EncodingResult};
pub use evaluator::ExpressionEvaluator;
pub use expression::{Expression, Location, Value, Variable};
pub use heap::{make_heap, ArrayHeap, ByteArrayHeap, SmtHeap, UfHeap, BYTE_HEAP_NAME};
pub use merge::{MergeResult, PointerTargetSetMerger};
pub use pattern::{PointerTargetPattern, PointerTargetPatternBuilder, RangePattern, TargetMatcher};
pub use pointer_target_set::{allocation_type, PointerTargetSet, PointerTargetSetBuilder};
pub use region::{
    BnBRegionManager, DefaultRegionManager, MemoryRegion, MemoryRegionManager, RegionStatistics,
};
pub use ssa::{Constraints, SsaMap, SsaMapBuilder};
pub use target::{base_address, base_address_name, CompositeField, PointerTarget};
pub use visitor::{BaseVisitor, PointerApproximatingVisitor};
