//! Evaluation of typed C expressions
//!
//! [`ExpressionEvaluator`] turns a [`CExpr`] into an [`Expression`] against
//! the current SSA indices and pointer target set. Reading a field of a heap
//! object starts tracking that field; casting a deferred allocation pointer
//! to a typed pointer resolves the allocation.

use crate::assignment::{value_sort, ScalarWrite};
use crate::deferred::DeferredAllocation;
use crate::error::{EncodingError, EncodingResult};
use crate::expression::{Expression, Location, Value, Variable};
use crate::heap::SmtHeap;
use crate::pattern::{PointerTargetPattern, PointerTargetPatternBuilder};
use crate::pointer_target_set::PointerTargetSetBuilder;
use crate::region::MemoryRegion;
use crate::ssa::SsaMapBuilder;
use crate::target::base_address;
use crate::visitor::{field_variable_name, BaseVisitor, PointerApproximatingVisitor};
use c2smt_formula::{Sort, Term};
use c2smt_types::{BinOp, CExpr, CExprKind, CType, IntKind, UnaryOp};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use tracing::trace;

/// A scalar part of a (possibly composite) location
#[derive(Debug, Clone)]
pub struct ScalarLeaf {
    pub location: Location,
    pub pattern: PointerTargetPatternBuilder,
    pub ty: CType,
}

fn is_float(ty: &CType) -> bool {
    matches!(ty, CType::Float(_))
}

fn is_address(ty: &CType) -> bool {
    ty.is_pointer() || ty.is_array()
}

/// Size of the objects `ty` points to; `void` and incomplete types count
/// as bytes
fn pointee_size(ty: &CType) -> u64 {
    let size = match ty {
        CType::Pointer(t) | CType::Array(t, _) => t.size(),
        _ => 1,
    };
    size.max(1) as u64
}

fn bv_width(term: &Term) -> EncodingResult<u32> {
    term.sort().bv_width().ok_or_else(|| {
        EncodingError::InvariantViolation(format!("expected a bitvector value, got {term}"))
    })
}

/// Extend or truncate `value` to `width` bits
fn resize(value: Term, signed: bool, width: u32) -> EncodingResult<Term> {
    let current = bv_width(&value)?;
    Ok(match current.cmp(&width) {
        Ordering::Less if signed => Term::sign_extend(value, width - current)?,
        Ordering::Less => Term::zero_extend(value, width - current)?,
        Ordering::Greater => Term::extract(value, width - 1, 0)?,
        Ordering::Equal => value,
    })
}

/// `value != 0`
pub(crate) fn is_nonzero(value: Term) -> EncodingResult<Term> {
    let zero = Term::number(&value.sort(), 0)?;
    Ok(Term::not(Term::eq(value, zero)?))
}

/// `1` if `condition` holds, else `0`
fn from_bool(condition: Term, sort: &Sort) -> EncodingResult<Term> {
    Ok(Term::ite(
        condition,
        Term::number(sort, 1)?,
        Term::number(sort, 0)?,
    )?)
}

/// Evaluates expressions of one edge
pub struct ExpressionEvaluator<'a> {
    pts: &'a mut PointerTargetSetBuilder,
    ssa: &'a SsaMapBuilder,
    heap: &'a dyn SmtHeap,
    pointer_width: u32,
    regions: FxHashMap<CType, MemoryRegion>,
    resolved: Vec<DeferredAllocation>,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(
        pts: &'a mut PointerTargetSetBuilder,
        ssa: &'a SsaMapBuilder,
        heap: &'a dyn SmtHeap,
    ) -> Self {
        let pointer_width = pts.config().pointer_width;
        Self {
            pts,
            ssa,
            heap,
            pointer_width,
            regions: FxHashMap::default(),
            resolved: Vec::new(),
        }
    }

    /// Deferred allocations resolved while evaluating
    pub fn into_resolved(self) -> Vec<DeferredAllocation> {
        self.resolved
    }

    pub fn sort_of(&self, ty: &CType) -> EncodingResult<Sort> {
        value_sort(ty, self.pointer_width)
    }

    fn region(&mut self, ty: &CType) -> EncodingResult<MemoryRegion> {
        if let Some(region) = self.regions.get(ty) {
            return Ok(region.clone());
        }
        let region = self.pts.regions().make_memory_region(ty)?;
        self.regions.insert(ty.clone(), region.clone());
        Ok(region)
    }

    /// Region of values of `ty`, for scalar types
    fn region_for(&mut self, ty: &CType) -> EncodingResult<Option<MemoryRegion>> {
        if ty.is_scalar() {
            self.region(ty).map(Some)
        } else {
            Ok(None)
        }
    }

    fn shifted(&self, address: &Term, offset: u64) -> EncodingResult<Term> {
        Ok(Term::bv_add(
            address.clone(),
            Term::bv(i128::from(offset), self.pointer_width),
        )?)
    }

    pub fn evaluate(&mut self, e: &CExpr) -> EncodingResult<Expression> {
        let ty = e.ty.simplified();
        match &e.kind {
            CExprKind::Id(_) | CExprKind::FieldRef { .. } => {
                if let Some(variable) = BaseVisitor::new(&*self.pts).visit(e)? {
                    return Ok(Expression::unaliased(variable));
                }
                match &e.kind {
                    CExprKind::Id(name) => self.evaluate_base(name, &ty),
                    _ => self.evaluate_field(e),
                }
            }
            CExprKind::IntLit(v) => Ok(Expression::value(Term::number(&self.sort_of(&ty)?, *v)?)),
            CExprKind::Deref(operand) => {
                let Value::Term(address) = self.evaluate_value(operand)? else {
                    return Err(EncodingError::Unsupported(
                        "dereference of an unknown pointer".to_string(),
                    ));
                };
                Ok(Expression::aliased(address, self.region_for(&ty)?))
            }
            CExprKind::AddressOf(operand) => match self.evaluate(operand)? {
                Expression::Location(Location::Aliased { address, .. }) => {
                    Ok(Expression::value(address))
                }
                Expression::Location(Location::Unaliased { variable }) => {
                    Err(EncodingError::InvariantViolation(format!(
                        "address of {} is taken but it is not in the heap",
                        variable.name()
                    )))
                }
                Expression::Value(_) => Err(EncodingError::UnrecognizedCode(format!(
                    "address of a value of type {}",
                    operand.ty
                ))),
            },
            CExprKind::Subscript { array, index } => {
                let array_ty = array.ty.simplified();
                let index_ty = index.ty.simplified();
                let (Value::Term(base), Value::Term(index)) =
                    (self.evaluate_value(array)?, self.evaluate_value(index)?)
                else {
                    return Err(EncodingError::Unsupported(
                        "subscript with an unknown address or index".to_string(),
                    ));
                };
                let address = self.offset_pointer(base, &array_ty, index, &index_ty, false)?;
                Ok(Expression::aliased(address, self.region_for(&ty)?))
            }
            CExprKind::Binary { op, left, right } => {
                self.evaluate_binary(*op, left, right, &ty).map(Expression::Value)
            }
            CExprKind::Unary { op, operand } => {
                self.evaluate_unary(*op, operand, &ty).map(Expression::Value)
            }
            CExprKind::Cast(operand) => self.evaluate_cast(operand, &ty),
            CExprKind::ComplexCast { .. } => Err(EncodingError::Unsupported(
                "casts of complex values".to_string(),
            )),
            CExprKind::Call { function, .. } => {
                trace!(function = function.as_str(), "call result is nondeterministic");
                Ok(Expression::nondet())
            }
        }
    }

    fn evaluate_base(&mut self, name: &str, ty: &CType) -> EncodingResult<Expression> {
        if !self.pts.is_actual_base(name) {
            return Err(EncodingError::InvariantViolation(format!(
                "{name} of type {ty} must live in the heap but was never declared"
            )));
        }
        let address = base_address(name, self.pointer_width);
        Ok(Expression::aliased(address, self.region_for(ty)?))
    }

    fn evaluate_field(&mut self, e: &CExpr) -> EncodingResult<Expression> {
        let e = e.with_explicit_pointer_dereference();
        let CExprKind::FieldRef { owner, field, .. } = &e.kind else {
            return Err(EncodingError::UnrecognizedCode(
                "field access without an owner".to_string(),
            ));
        };
        let owner_ty = owner.ty.simplified();
        if !owner_ty.is_composite() {
            return Err(EncodingError::UnrecognizedCode(format!(
                "field {field} of non-composite type {owner_ty}"
            )));
        }
        let offset = owner_ty.field_offset(field).ok_or_else(|| {
            EncodingError::UnrecognizedCode(format!("{owner_ty} has no field {field}"))
        })?;
        let ty = e.ty.simplified();
        match self.evaluate(owner)? {
            Expression::Location(Location::Unaliased { variable }) => Ok(Expression::unaliased(
                Variable::new(field_variable_name(variable.name(), field), ty),
            )),
            Expression::Location(Location::Aliased { address, .. }) => {
                self.pts.add_field(&owner_ty, field)?;
                let region = if ty.is_scalar() {
                    Some(
                        self.pts
                            .regions()
                            .make_memory_region_for_field(&owner_ty, &ty, field)?,
                    )
                } else {
                    None
                };
                Ok(Expression::aliased(self.shifted(&address, offset as u64)?, region))
            }
            Expression::Value(_) => Err(EncodingError::UnrecognizedCode(format!(
                "field {field} of a value"
            ))),
        }
    }

    /// Value of `e`, reading locations
    pub fn evaluate_value(&mut self, e: &CExpr) -> EncodingResult<Value> {
        let result = self.evaluate(e)?;
        self.to_value(result, &e.ty.simplified())
    }

    pub fn evaluate_location(&mut self, e: &CExpr) -> EncodingResult<Location> {
        match self.evaluate(e)? {
            Expression::Location(location) => Ok(location),
            Expression::Value(_) => Err(EncodingError::UnrecognizedCode(format!(
                "assignment to a value of type {}",
                e.ty
            ))),
        }
    }

    pub fn to_value(&mut self, expression: Expression, ty: &CType) -> EncodingResult<Value> {
        match expression {
            Expression::Value(value) => Ok(value),
            Expression::Location(location) => self.read(&location, ty),
        }
    }

    /// Current value of type `ty` at `location`. Arrays decay to their
    /// address.
    pub fn read(&mut self, location: &Location, ty: &CType) -> EncodingResult<Value> {
        match location {
            Location::Unaliased { variable } => {
                let sort = self.sort_of(ty)?;
                Ok(Value::Term(self.ssa.term(variable.name(), sort)))
            }
            Location::Aliased { address, region } => {
                if ty.is_array() {
                    return Ok(Value::Term(address.clone()));
                }
                let sort = self.sort_of(ty)?;
                let region = match region {
                    Some(region) => region.clone(),
                    None => self.region(ty)?,
                };
                let symbol = self.pts.regions().pointer_access_name(&region);
                let index = self.ssa.index(&self.heap.heap_symbol(&symbol));
                Ok(Value::Term(self.heap.make_indexed_pointer_dereference(
                    &symbol, &sort, index, address,
                )?))
            }
        }
    }

    /// Convert `value` of type `from` to type `to`. Conversions involving
    /// floating point values are not modelled.
    pub fn convert(&self, value: Value, from: &CType, to: &CType) -> EncodingResult<Value> {
        let Value::Term(term) = value else {
            return Ok(Value::Nondet);
        };
        if from == to {
            return Ok(Value::Term(term));
        }
        if is_float(from) || is_float(to) {
            return Ok(Value::Nondet);
        }
        let sort = self.sort_of(to)?;
        if matches!(to, CType::Int(IntKind::Bool, _)) {
            return Ok(Value::Term(from_bool(is_nonzero(term)?, &sort)?));
        }
        let width = sort.bv_width().unwrap_or(self.pointer_width);
        Ok(Value::Term(resize(term, from.is_signed(), width)?))
    }

    /// `pointer ± index * sizeof(*pointer)`
    fn offset_pointer(
        &self,
        pointer: Term,
        pointer_ty: &CType,
        index: Term,
        index_ty: &CType,
        subtract: bool,
    ) -> EncodingResult<Term> {
        let w = self.pointer_width;
        let index = resize(index, index_ty.is_signed(), w)?;
        let scaled = Term::bv_mul(index, Term::bv(i128::from(pointee_size(pointer_ty)), w))?;
        Ok(if subtract {
            Term::bv_sub(pointer, scaled)?
        } else {
            Term::bv_add(pointer, scaled)?
        })
    }

    /// Both operands brought to a common width, and whether to compare them
    /// as signed
    fn common_operands(
        &self,
        l: Term,
        lt: &CType,
        r: Term,
        rt: &CType,
    ) -> EncodingResult<(Term, Term, bool)> {
        if is_address(lt) || is_address(rt) {
            let w = self.pointer_width;
            return Ok((resize(l, lt.is_signed(), w)?, resize(r, rt.is_signed(), w)?, false));
        }
        let (lw, rw) = (bv_width(&l)?, bv_width(&r)?);
        let signed = match lw.cmp(&rw) {
            Ordering::Less => rt.is_signed(),
            Ordering::Greater => lt.is_signed(),
            Ordering::Equal => lt.is_signed() && rt.is_signed(),
        };
        let width = lw.max(rw);
        Ok((
            resize(l, lt.is_signed(), width)?,
            resize(r, rt.is_signed(), width)?,
            signed,
        ))
    }

    fn evaluate_binary(
        &mut self,
        op: BinOp,
        left: &CExpr,
        right: &CExpr,
        ty: &CType,
    ) -> EncodingResult<Value> {
        let (lt, rt) = (left.ty.simplified(), right.ty.simplified());
        let (l, r) = (self.evaluate_value(left)?, self.evaluate_value(right)?);
        let (Value::Term(l), Value::Term(r)) = (l, r) else {
            return Ok(Value::Nondet);
        };
        if is_float(&lt) || is_float(&rt) || is_float(ty) {
            return Ok(Value::Nondet);
        }
        let sort = self.sort_of(ty)?;

        if op.is_logical() {
            let (l, r) = (is_nonzero(l)?, is_nonzero(r)?);
            let condition = match op {
                BinOp::LogAnd => Term::and(l, r),
                _ => Term::or(l, r),
            };
            return Ok(Value::Term(from_bool(condition, &sort)?));
        }
        if op.is_comparison() {
            let (l, r, signed) = self.common_operands(l, &lt, r, &rt)?;
            let condition = match op {
                BinOp::Eq => Term::eq(l, r)?,
                BinOp::Ne => Term::not(Term::eq(l, r)?),
                BinOp::Lt => Term::less_than(l, r, signed)?,
                BinOp::Le => Term::less_or_equal(l, r, signed)?,
                BinOp::Gt => Term::greater_than(l, r, signed)?,
                _ => Term::greater_or_equal(l, r, signed)?,
            };
            return Ok(Value::Term(from_bool(condition, &sort)?));
        }

        match (op, is_address(&lt), is_address(&rt)) {
            (BinOp::Add, true, false) => {
                return Ok(Value::Term(self.offset_pointer(l, &lt, r, &rt, false)?));
            }
            (BinOp::Add, false, true) => {
                return Ok(Value::Term(self.offset_pointer(r, &rt, l, &lt, false)?));
            }
            (BinOp::Sub, true, false) => {
                return Ok(Value::Term(self.offset_pointer(l, &lt, r, &rt, true)?));
            }
            (BinOp::Sub, true, true) => {
                let w = self.pointer_width;
                let difference = Term::bv_sub(l, r)?;
                let elements = Term::bv_div(
                    difference,
                    Term::bv(i128::from(pointee_size(&lt)), w),
                    true,
                )?;
                let width = sort.bv_width().unwrap_or(w);
                return Ok(Value::Term(resize(elements, true, width)?));
            }
            _ => {}
        }

        let signed = ty.is_signed();
        let width = sort.bv_width().unwrap_or(self.pointer_width);
        let l = resize(l, lt.is_signed(), width)?;
        let r = resize(r, rt.is_signed(), width)?;
        let result = match op {
            BinOp::Add => Term::bv_add(l, r)?,
            BinOp::Sub => Term::bv_sub(l, r)?,
            BinOp::Mul => Term::bv_mul(l, r)?,
            BinOp::Div => Term::bv_div(l, r, signed)?,
            BinOp::Mod => Term::bv_rem(l, r, signed)?,
            BinOp::BitAnd => Term::bv_and(l, r)?,
            BinOp::BitOr => Term::bv_or(l, r)?,
            BinOp::BitXor => Term::bv_xor(l, r)?,
            BinOp::Shl => Term::bv_shl(l, r)?,
            BinOp::Shr => Term::bv_shr(l, r, lt.is_signed())?,
            other => {
                return Err(EncodingError::UnrecognizedCode(format!(
                    "binary operator {other:?}"
                )))
            }
        };
        Ok(Value::Term(result))
    }

    fn evaluate_unary(
        &mut self,
        op: UnaryOp,
        operand: &CExpr,
        ty: &CType,
    ) -> EncodingResult<Value> {
        let operand_ty = operand.ty.simplified();
        let Value::Term(value) = self.evaluate_value(operand)? else {
            return Ok(Value::Nondet);
        };
        if is_float(&operand_ty) || is_float(ty) {
            return Ok(Value::Nondet);
        }
        let sort = self.sort_of(ty)?;
        if op == UnaryOp::LogNot {
            return Ok(Value::Term(from_bool(Term::not(is_nonzero(value)?), &sort)?));
        }
        let width = sort.bv_width().unwrap_or(self.pointer_width);
        let value = resize(value, operand_ty.is_signed(), width)?;
        Ok(Value::Term(match op {
            UnaryOp::Neg => Term::bv_neg(value)?,
            _ => Term::bv_not(value)?,
        }))
    }

    fn evaluate_cast(&mut self, operand: &CExpr, target: &CType) -> EncodingResult<Expression> {
        if let Some(pointee) = target.pointee().filter(|t| !t.is_void()) {
            self.reveal(operand, pointee)?;
        }
        let from = operand.ty.simplified();
        let value = self.evaluate_value(operand)?;
        if target.is_void() {
            return Ok(Expression::nondet());
        }
        Ok(Expression::Value(self.convert(value, &from, target)?))
    }

    /// A cast to `pointee*` reveals the type of the deferred allocation the
    /// operand points to.
    fn reveal(&mut self, operand: &CExpr, pointee: &CType) -> EncodingResult<()> {
        let Some(pointer) = PointerApproximatingVisitor::new().visit(operand)? else {
            return Ok(());
        };
        if let Some(resolved) = self.pts.resolve_deferred_pointer(&pointer, pointee)? {
            trace!(pointer = pointer.as_str(), ty = %pointee, "cast reveals allocation type");
            self.resolved.extend(resolved);
        }
        Ok(())
    }

    /// Footprint of the lvalue `e`
    pub fn pattern(&self, e: &CExpr) -> EncodingResult<PointerTargetPatternBuilder> {
        match &e.kind {
            CExprKind::Id(name) if self.pts.is_actual_base(name) => {
                Ok(PointerTargetPattern::for_base_object(name.clone()))
            }
            CExprKind::FieldRef { .. } => {
                let e = e.with_explicit_pointer_dereference();
                let CExprKind::FieldRef { owner, field, .. } = &e.kind else {
                    return Ok(PointerTargetPatternBuilder::any());
                };
                let owner_ty = owner.ty.simplified();
                let offset = owner_ty.field_offset(field).ok_or_else(|| {
                    EncodingError::UnrecognizedCode(format!("{owner_ty} has no field {field}"))
                })?;
                let mut pattern = self.pattern(owner)?;
                pattern.shift_container(owner_ty, offset as u64);
                Ok(pattern)
            }
            CExprKind::Subscript { array, index } => {
                let array_ty = array.ty.simplified();
                if !array_ty.is_array() {
                    return Ok(PointerTargetPatternBuilder::any());
                }
                let mut pattern = self.pattern(array)?;
                let element_size = pointee_size(&array_ty);
                match &index.kind {
                    CExprKind::IntLit(i) if *i >= 0 => {
                        let i = u64::try_from(*i).unwrap_or(u64::MAX);
                        pattern.shift_container(array_ty, i.saturating_mul(element_size));
                    }
                    _ => {
                        pattern.shift(array_ty);
                    }
                }
                Ok(pattern)
            }
            CExprKind::Deref(operand) => match &operand.kind {
                CExprKind::AddressOf(inner) => self.pattern(inner),
                _ => Ok(PointerTargetPatternBuilder::any()),
            },
            CExprKind::Cast(operand) => self.pattern(operand),
            _ => Ok(PointerTargetPatternBuilder::any()),
        }
    }

    /// Scalar parts of an object of type `ty` at `location`, in layout
    /// order. Arrays contribute their tracked elements only.
    pub fn scalar_leaves(
        &mut self,
        location: Location,
        pattern: PointerTargetPatternBuilder,
        ty: &CType,
    ) -> EncodingResult<Vec<ScalarLeaf>> {
        let mut leaves = Vec::new();
        self.collect_leaves(location, pattern, ty, &mut leaves)?;
        Ok(leaves)
    }

    fn collect_leaves(
        &mut self,
        location: Location,
        pattern: PointerTargetPatternBuilder,
        ty: &CType,
        out: &mut Vec<ScalarLeaf>,
    ) -> EncodingResult<()> {
        match ty {
            CType::Struct { .. } | CType::Union { .. } => {
                for field in ty.fields() {
                    let offset = ty.field_offset(&field.name).unwrap_or(0) as u64;
                    let sub = match &location {
                        Location::Unaliased { variable } => Location::unaliased(Variable::new(
                            field_variable_name(variable.name(), &field.name),
                            field.ty.clone(),
                        )),
                        Location::Aliased { address, .. } => {
                            self.pts.add_field(ty, &field.name)?;
                            let region = if field.ty.is_scalar() {
                                Some(self.pts.regions().make_memory_region_for_field(
                                    ty,
                                    &field.ty,
                                    &field.name,
                                )?)
                            } else {
                                None
                            };
                            Location::aliased(self.shifted(address, offset)?, region)
                        }
                    };
                    let mut sub_pattern = pattern.clone();
                    sub_pattern.shift_container(ty.clone(), offset);
                    self.collect_leaves(sub, sub_pattern, &field.ty, out)?;
                }
            }
            CType::Array(element, _) => {
                let Location::Aliased { address, .. } = &location else {
                    return Err(EncodingError::InvariantViolation(format!(
                        "array of type {ty} outside the heap"
                    )));
                };
                let length = self.pts.config().tracked_array_length(ty) as u64;
                let element_size = element.size() as u64;
                for i in 0..length {
                    let offset = i * element_size;
                    let sub = Location::aliased(
                        self.shifted(address, offset)?,
                        self.region_for(element)?,
                    );
                    let mut sub_pattern = pattern.clone();
                    sub_pattern.shift_container(ty.clone(), offset);
                    self.collect_leaves(sub, sub_pattern, element, out)?;
                }
            }
            ty if ty.is_scalar() => {
                let location = match location {
                    Location::Aliased {
                        address,
                        region: None,
                    } => Location::aliased(address, self.region_for(ty)?),
                    other => other,
                };
                out.push(ScalarLeaf {
                    location,
                    pattern,
                    ty: ty.clone(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Writes storing zero into every scalar part of base `base` of type `ty`
    pub fn zero_writes(&mut self, base: &str, ty: &CType) -> EncodingResult<Vec<ScalarWrite>> {
        let location = Location::aliased(base_address(base, self.pointer_width), None);
        let leaves =
            self.scalar_leaves(location, PointerTargetPattern::for_base_object(base), ty)?;
        leaves
            .into_iter()
            .map(|leaf| {
                let zero = Term::number(&self.sort_of(&leaf.ty)?, 0)?;
                Ok(ScalarWrite {
                    location: leaf.location,
                    pattern: leaf.pattern.build(),
                    ty: leaf.ty,
                    value: Value::Term(zero),
                })
            })
            .collect()
    }

    /// Scalar writes storing `rhs` (of type `rhs_ty`) into `location` of
    /// type `ty`. Composite assignments copy every scalar leaf.
    pub fn assignment_writes(
        &mut self,
        location: Location,
        pattern: PointerTargetPatternBuilder,
        ty: &CType,
        rhs: Expression,
        rhs_ty: &CType,
    ) -> EncodingResult<Vec<ScalarWrite>> {
        if ty.is_scalar() {
            let value = self.to_value(rhs, rhs_ty)?;
            let value = self.convert(value, rhs_ty, ty)?;
            let leaves = self.scalar_leaves(location, pattern, ty)?;
            return Ok(leaves
                .into_iter()
                .map(|leaf| ScalarWrite {
                    location: leaf.location,
                    pattern: leaf.pattern.build(),
                    ty: leaf.ty,
                    value: value.clone(),
                })
                .collect());
        }

        let leaves = self.scalar_leaves(location, pattern, ty)?;
        let values = match rhs {
            Expression::Location(source) => {
                let sources = self.scalar_leaves(source, PointerTargetPatternBuilder::any(), ty)?;
                let mut values = Vec::with_capacity(sources.len());
                for leaf in &sources {
                    values.push(self.read(&leaf.location, &leaf.ty)?);
                }
                values
            }
            Expression::Value(Value::Nondet) => vec![Value::Nondet; leaves.len()],
            Expression::Value(Value::Term(_)) => {
                return Err(EncodingError::Unsupported(format!(
                    "assignment of a single value to an object of type {ty}"
                )))
            }
        };
        Ok(leaves
            .into_iter()
            .zip(values)
            .map(|(leaf, value)| ScalarWrite {
                location: leaf.location,
                pattern: leaf.pattern.build(),
                ty: leaf.ty,
                value,
            })
            .collect())
    }
}
