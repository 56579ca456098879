//! Edge-level encoding against the memory model
//!
//! [`PointerAliasingEncoder`] encodes declarations, assignments and
//! assumptions of single CFA edges and joins the states of merging paths.
//! Each operation takes the [`PathState`] before the edge and returns the
//! state after it together with the edge formula; the input state is never
//! modified, so diverging paths can keep encoding from a shared ancestor.

use crate::assignment::{AssignmentEncoder, ScalarWrite, NONDET_PREFIX};
use crate::config::{FieldClassification, PointerAliasingConfig};
use crate::deferred::DeferredAllocation;
use crate::error::{EncodingError, EncodingResult};
use crate::evaluator::{is_nonzero, ExpressionEvaluator};
use crate::expression::{Expression, Value};
use crate::heap::{is_heap_symbol, make_heap, SmtHeap};
use crate::merge::PointerTargetSetMerger;
use crate::pointer_target_set::{allocation_type, PointerTargetSet, PointerTargetSetBuilder};
use crate::region::{BnBRegionManager, DefaultRegionManager, MemoryRegionManager};
use crate::ssa::{Constraints, SsaMap, SsaMapBuilder};
use crate::target::{base_address, PointerTarget};
use crate::visitor::PointerApproximatingVisitor;
use c2smt_formula::{ssa_name, Sort, Term};
use c2smt_types::{CExpr, CExprKind, CType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// SSA indices and memory model at one program point of one path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathState {
    pub ssa: SsaMap,
    pub pts: PointerTargetSet,
}

/// Formula of one edge and the state after it
#[derive(Debug, Clone)]
pub struct EncodedEdge {
    pub formula: Term,
    pub state: PathState,
    /// Targets the edge may have changed
    pub invalidated: Vec<PointerTarget>,
}

/// Joined state plus the formulas unifying each incoming path with it
#[derive(Debug, Clone)]
pub struct MergedStates {
    pub state: PathState,
    pub left_formula: Term,
    pub right_formula: Term,
}

/// A call to a configured allocation function on the right of an assignment
struct AllocationCall<'e> {
    function: &'e str,
    args: &'e [CExpr],
    zeroed: bool,
    /// Type of the allocated objects, when the assignment reveals it
    revealed: Option<CType>,
}

struct Allocated {
    base: String,
    size: Option<u64>,
    zeroed: bool,
    deferred: bool,
    prefill: Option<CType>,
}

fn strip_casts(e: &CExpr) -> &CExpr {
    match &e.kind {
        CExprKind::Cast(operand) => strip_casts(operand),
        _ => e,
    }
}

fn literal_value(e: &CExpr) -> Option<i128> {
    match &strip_casts(e).kind {
        CExprKind::IntLit(v) => Some(*v),
        _ => None,
    }
}

fn non_void_pointee(ty: &CType) -> Option<CType> {
    ty.pointee().filter(|t| !t.is_void()).cloned()
}

/// Encodes edges with the configured heap and region model
#[derive(Debug)]
pub struct PointerAliasingEncoder {
    config: Arc<PointerAliasingConfig>,
    classification: FieldClassification,
    regions: Arc<dyn MemoryRegionManager>,
    heap: Box<dyn SmtHeap>,
    merger: PointerTargetSetMerger,
}

impl PointerAliasingEncoder {
    pub fn new(config: PointerAliasingConfig, classification: FieldClassification) -> Self {
        let regions: Arc<dyn MemoryRegionManager> = if config.use_memory_regions {
            Arc::new(BnBRegionManager::new(&classification))
        } else {
            Arc::new(DefaultRegionManager::new())
        };
        let heap = make_heap(&config);
        let config = Arc::new(config);
        let merger = PointerTargetSetMerger::new(Arc::clone(&config), Arc::clone(&regions));
        Self {
            config,
            classification,
            regions,
            heap,
            merger,
        }
    }

    pub fn config(&self) -> &PointerAliasingConfig {
        &self.config
    }

    pub fn regions(&self) -> &Arc<dyn MemoryRegionManager> {
        &self.regions
    }

    pub fn heap(&self) -> &dyn SmtHeap {
        self.heap.as_ref()
    }

    fn pts_builder(&self, state: &PathState) -> PointerTargetSetBuilder {
        state
            .pts
            .builder(Arc::clone(&self.config), Arc::clone(&self.regions))
    }

    fn prefills(&self, size: Option<u64>) -> bool {
        let limit = self.config.max_prefilled_allocation_size;
        matches!(size, Some(size) if limit > 0 && size <= limit)
    }

    /// Declare `name` of type `ty`. Address-taken variables and variables
    /// containing arrays become heap bases.
    pub fn declare_variable(
        &self,
        name: &str,
        ty: &CType,
        state: &PathState,
    ) -> EncodingResult<EncodedEdge> {
        let ty = ty.simplified();
        let mut pts = self.pts_builder(state);
        let mut constraints = Constraints::new();
        if self.classification.is_addressed_variable(name) || ty.contains_array() {
            let size = Term::bv(ty.size() as i128, self.config.pointer_width);
            pts.make_allocation(name, &ty, size, &mut constraints)?;
        }
        Ok(EncodedEdge {
            formula: constraints.to_formula(),
            state: PathState {
                ssa: state.ssa.clone(),
                pts: pts.build(),
            },
            invalidated: Vec::new(),
        })
    }

    fn allocation_call<'e>(&self, lhs_ty: &CType, rhs: &'e CExpr) -> Option<AllocationCall<'e>> {
        if !lhs_ty.is_pointer() {
            return None;
        }
        let CExprKind::Call { function, args } = &strip_casts(rhs).kind else {
            return None;
        };
        let zeroed = self.config.allocation_kind(function)?;
        let revealed =
            non_void_pointee(&rhs.ty.simplified()).or_else(|| non_void_pointee(lhs_ty));
        Some(AllocationCall {
            function,
            args,
            zeroed,
            revealed,
        })
    }

    /// Register the object returned by `call`
    fn allocate(
        &self,
        edge: &str,
        call: &AllocationCall<'_>,
        pts: &mut PointerTargetSetBuilder,
        ssa: &SsaMapBuilder,
        constraints: &mut Constraints,
    ) -> EncodingResult<Allocated> {
        let w = self.config.pointer_width;
        let size_args = if call.zeroed {
            call.args
        } else {
            &call.args[..call.args.len().min(1)]
        };
        if size_args.is_empty() {
            return Err(EncodingError::UnrecognizedCode(format!(
                "{} called without a size",
                call.function
            )));
        }

        let mut sizes = Vec::with_capacity(size_args.len());
        {
            let mut eval = ExpressionEvaluator::new(pts, ssa, self.heap.as_ref());
            for arg in size_args {
                let value = eval.evaluate_value(arg)?;
                sizes.push(eval.convert(value, &arg.ty.simplified(), &CType::size_t())?);
            }
        }
        let literal = size_args.iter().try_fold(1u64, |acc, arg| {
            let v = u64::try_from(literal_value(arg)?).ok()?;
            acc.checked_mul(v)
        });

        // sibling paths share counter values, so the site keeps names apart
        let base = pts.fresh_base_name(&format!("{edge}::{}", call.function));
        let size = match sizes.iter().map(Value::term).collect::<Option<Vec<_>>>() {
            Some(terms) => terms
                .into_iter()
                .cloned()
                .try_fold(Term::bv(1, w), Term::bv_mul)?,
            None => Term::var(format!("__SIZE_OF_{base}"), Sort::BitVec(w)),
        };

        let mut allocated = Allocated {
            base,
            size: literal,
            zeroed: call.zeroed,
            deferred: false,
            prefill: None,
        };
        let ty = match &call.revealed {
            Some(revealed) => allocation_type(revealed, literal),
            None if self.config.defer_untyped_allocations => {
                allocated.deferred = true;
                CType::fake_base(literal.and_then(|s| usize::try_from(s).ok()))
            }
            None => match literal.and_then(|s| usize::try_from(s).ok()) {
                Some(n) => CType::array(CType::char(), n),
                None => CType::unsized_array(CType::char()),
            },
        };
        debug!(
            base = allocated.base.as_str(),
            ty = %ty,
            deferred = allocated.deferred,
            "allocation"
        );
        pts.make_allocation(&allocated.base, &ty, size, constraints)?;
        if !allocated.deferred && call.zeroed && self.prefills(literal) {
            allocated.prefill = Some(ty);
        }
        Ok(allocated)
    }

    /// Zero writes for resolved allocations that were zeroed when made
    fn resolved_fills(
        &self,
        resolved: &[DeferredAllocation],
        pts: &mut PointerTargetSetBuilder,
        ssa: &SsaMapBuilder,
    ) -> EncodingResult<Vec<ScalarWrite>> {
        let mut writes = Vec::new();
        for allocation in resolved {
            if !allocation.zeroed || !self.prefills(allocation.size) {
                continue;
            }
            let Some(ty) = pts.base_type(&allocation.base).cloned() else {
                continue;
            };
            let mut eval = ExpressionEvaluator::new(pts, ssa, self.heap.as_ref());
            writes.extend(eval.zero_writes(&allocation.base, &ty)?);
        }
        Ok(writes)
    }

    /// Update the deferred pools after `lhs` was assigned
    fn track_deferred_pointers(
        &self,
        lhs: &CExpr,
        lhs_ty: &CType,
        rhs: &CExpr,
        allocated: Option<&Allocated>,
        pts: &mut PointerTargetSetBuilder,
    ) -> EncodingResult<Vec<DeferredAllocation>> {
        if !matches!(lhs.kind, CExprKind::Id(_) | CExprKind::FieldRef { .. }) {
            return Ok(Vec::new());
        }
        let visitor = PointerApproximatingVisitor::new();
        let Some(lhs_name) = visitor.visit(lhs)? else {
            return Ok(Vec::new());
        };
        if let Some(allocated) = allocated.filter(|a| a.deferred) {
            pts.start_deferred_allocation(
                &lhs_name,
                &allocated.base,
                allocated.size,
                allocated.zeroed,
            );
            return Ok(Vec::new());
        }
        let rhs_ty = rhs.ty.simplified();
        let rhs_name = if allocated.is_none() && (rhs_ty.is_pointer() || rhs_ty.is_array()) {
            visitor.visit(rhs)?
        } else {
            None
        };
        match rhs_name {
            // pointer arithmetic within the same allocation
            Some(rhs_name) if rhs_name == lhs_name => Ok(Vec::new()),
            Some(rhs_name) if pts.deferred_pool(&rhs_name).is_some() => {
                match non_void_pointee(lhs_ty) {
                    Some(revealed) => {
                        pts.remove_deferred_pointer(&lhs_name);
                        Ok(pts
                            .resolve_deferred_pointer(&rhs_name, &revealed)?
                            .unwrap_or_default())
                    }
                    None => {
                        pts.add_deferred_pointer(&lhs_name, &rhs_name);
                        Ok(Vec::new())
                    }
                }
            }
            _ => {
                pts.remove_deferred_pointer(&lhs_name);
                Ok(Vec::new())
            }
        }
    }

    /// Encode `lhs = rhs` on edge `edge`
    pub fn encode_assignment(
        &self,
        edge: &str,
        lhs: &CExpr,
        rhs: &CExpr,
        state: &PathState,
    ) -> EncodingResult<EncodedEdge> {
        let w = self.config.pointer_width;
        let lhs_ty = lhs.ty.simplified();
        let mut pts = self.pts_builder(state);
        let mut ssa = state.ssa.builder();
        let mut constraints = Constraints::new();

        let allocated = match self.allocation_call(&lhs_ty, rhs) {
            Some(call) => Some(self.allocate(edge, &call, &mut pts, &ssa, &mut constraints)?),
            None => None,
        };

        let (mut fills, writes, mut resolved) = {
            let mut eval = ExpressionEvaluator::new(&mut pts, &ssa, self.heap.as_ref());
            let fills = match allocated.as_ref().and_then(|a| Some((&a.base, a.prefill.as_ref()?))) {
                Some((base, ty)) => eval.zero_writes(base, ty)?,
                None => Vec::new(),
            };
            let location = eval.evaluate_location(lhs)?;
            let pattern = eval.pattern(lhs)?;
            let (value, value_ty) = match &allocated {
                Some(a) => (Expression::value(base_address(&a.base, w)), lhs_ty.clone()),
                None => (eval.evaluate(rhs)?, rhs.ty.simplified()),
            };
            let writes = eval.assignment_writes(location, pattern, &lhs_ty, value, &value_ty)?;
            (fills, writes, eval.into_resolved())
        };

        resolved.extend(self.track_deferred_pointers(
            lhs,
            &lhs_ty,
            rhs,
            allocated.as_ref(),
            &mut pts,
        )?);
        fills.extend(self.resolved_fills(&resolved, &mut pts, &ssa)?);

        let assigner = AssignmentEncoder::new(self.heap.as_ref(), edge, w);
        let mut parts: Vec<Term> = constraints.iter().cloned().collect();
        let mut invalidated = Vec::new();
        if !fills.is_empty() {
            let fill = assigner.assign(fills, &mut ssa, &pts)?;
            parts.push(fill.formula);
            invalidated.extend(fill.invalidated);
        }
        let assignment = assigner.assign(writes, &mut ssa, &pts)?;
        parts.push(assignment.formula);
        for target in assignment.invalidated {
            if !invalidated.contains(&target) {
                invalidated.push(target);
            }
        }

        Ok(EncodedEdge {
            formula: Term::and_all(parts),
            state: PathState {
                ssa: ssa.build(),
                pts: pts.build(),
            },
            invalidated,
        })
    }

    /// Encode the assumption that `condition` evaluates to `truth`
    pub fn encode_assume(
        &self,
        edge: &str,
        condition: &CExpr,
        truth: bool,
        state: &PathState,
    ) -> EncodingResult<EncodedEdge> {
        let mut pts = self.pts_builder(state);
        let mut ssa = state.ssa.builder();
        let (value, resolved) = {
            let mut eval = ExpressionEvaluator::new(&mut pts, &ssa, self.heap.as_ref());
            let value = eval.evaluate_value(condition)?;
            (value, eval.into_resolved())
        };
        let mut parts = vec![match value {
            Value::Term(t) if truth => is_nonzero(t)?,
            Value::Term(t) => Term::not(is_nonzero(t)?),
            Value::Nondet => Term::bool_const(true),
        }];

        let fills = self.resolved_fills(&resolved, &mut pts, &ssa)?;
        let mut invalidated = Vec::new();
        if !fills.is_empty() {
            let w = self.config.pointer_width;
            let fill = AssignmentEncoder::new(self.heap.as_ref(), edge, w).assign(
                fills,
                &mut ssa,
                &pts,
            )?;
            parts.push(fill.formula);
            invalidated = fill.invalidated;
        }
        Ok(EncodedEdge {
            formula: Term::and_all(parts),
            state: PathState {
                ssa: ssa.build(),
                pts: pts.build(),
            },
            invalidated,
        })
    }

    /// `name@high` agrees with `name@low`
    fn unify(
        &self,
        name: &str,
        sort: &Sort,
        low: u32,
        high: u32,
        pts: &PointerTargetSet,
    ) -> EncodingResult<Term> {
        if !is_heap_symbol(name) {
            return Ok(Term::eq(
                Term::ssa_var(name, high, sort.clone()),
                Term::ssa_var(name, low, sort.clone()),
            )?);
        }
        match self.heap.make_identity_pointer_assignment(name, sort, low, high) {
            Ok(identity) => Ok(identity),
            Err(e) if e.is_unsupported() => {
                let mut cells = Vec::new();
                for target in pts.all_targets(name).iter() {
                    let address = target.address(self.config.pointer_width)?;
                    cells.push(Term::eq(
                        self.heap
                            .make_pointer_dereference(&ssa_name(name, high), sort, &address)?,
                        self.heap
                            .make_pointer_dereference(&ssa_name(name, low), sort, &address)?,
                    )?);
                }
                Ok(Term::and_all(cells))
            }
            Err(e) => Err(e),
        }
    }

    /// Join the states of two paths. Each side's formula brings its symbols
    /// up to the merged indices and adds the address constraints of bases
    /// only the other side allocated.
    pub fn merge_states(&self, left: &PathState, right: &PathState) -> EncodingResult<MergedStates> {
        let merged = self.merger.merge(&left.pts, &right.pts)?;
        let (ssa, differences) = SsaMap::merge(&left.ssa, &right.ssa);

        let mut left_parts: Vec<Term> = merged.left_constraints.iter().cloned().collect();
        let mut right_parts: Vec<Term> = merged.right_constraints.iter().cloned().collect();
        for (name, l, r) in differences {
            if name.starts_with(NONDET_PREFIX) {
                continue;
            }
            let sort = ssa.sort(&name).cloned().ok_or_else(|| {
                EncodingError::InvariantViolation(format!("no sort recorded for {name}"))
            })?;
            if l < r {
                left_parts.push(self.unify(&name, &sort, l, r, &merged.pts)?);
            } else {
                right_parts.push(self.unify(&name, &sort, r, l, &merged.pts)?);
            }
        }
        if left_parts.len() + right_parts.len() > 64 {
            warn!(
                left = left_parts.len(),
                right = right_parts.len(),
                "large merge"
            );
        }

        Ok(MergedStates {
            state: PathState {
                ssa,
                pts: merged.pts,
            },
            left_formula: Term::and_all(left_parts),
            right_formula: Term::and_all(right_parts),
        })
    }

    pub fn print_statistics(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.regions.print_statistics(out)
    }
}
