//! Syntactic approximations over C expressions
//!
//! [`BaseVisitor`] finds the unaliased variable an lvalue denotes, if any.
//! [`PointerApproximatingVisitor`] names the variable (or composite field)
//! a pointer-valued expression was most likely read from.

use crate::error::{EncodingError, EncodingResult};
use crate::expression::Variable;
use crate::pointer_target_set::{PointerTargetSet, PointerTargetSetBuilder};
use c2smt_types::{CExpr, CExprKind, CType};

/// Separator between an owner variable and a field in flattened names
pub const FIELD_SEPARATOR: char = '$';

/// Name of field `field` of unaliased variable `owner`
pub fn field_variable_name(owner: &str, field: &str) -> String {
    format!("{owner}{FIELD_SEPARATOR}{field}")
}

/// Name standing for field `field` of every object of type `owner`
pub fn field_access_name(owner: &CType, field: &str) -> String {
    format!("{}{FIELD_SEPARATOR}{field}", owner.type_to_string())
}

/// Which names are heap bases
pub trait BaseLookup {
    fn is_actual_base(&self, name: &str) -> bool;
}

impl BaseLookup for PointerTargetSet {
    fn is_actual_base(&self, name: &str) -> bool {
        PointerTargetSet::is_actual_base(self, name)
    }
}

impl BaseLookup for PointerTargetSetBuilder {
    fn is_actual_base(&self, name: &str) -> bool {
        PointerTargetSetBuilder::is_actual_base(self, name)
    }
}

fn composite_owner(owner: &CExpr) -> EncodingResult<CType> {
    let ty = owner.ty.simplified();
    if ty.is_composite() {
        Ok(ty)
    } else {
        Err(EncodingError::UnrecognizedCode(format!(
            "field owner of non-composite type {ty}"
        )))
    }
}

/// Resolves lvalues that do not live in the heap
pub struct BaseVisitor<'a, B: BaseLookup + ?Sized> {
    bases: &'a B,
}

impl<'a, B: BaseLookup + ?Sized> BaseVisitor<'a, B> {
    pub fn new(bases: &'a B) -> Self {
        Self { bases }
    }

    /// The unaliased variable `e` denotes, or `None` if `e` is in the heap
    pub fn visit(&self, e: &CExpr) -> EncodingResult<Option<Variable>> {
        match &e.kind {
            CExprKind::Id(name) => {
                let ty = e.ty.simplified();
                if self.bases.is_actual_base(name) || ty.contains_array() {
                    Ok(None)
                } else {
                    Ok(Some(Variable::new(name.clone(), ty)))
                }
            }
            CExprKind::FieldRef { .. } => {
                let e = e.with_explicit_pointer_dereference();
                let CExprKind::FieldRef { owner, field, .. } = &e.kind else {
                    return Ok(None);
                };
                composite_owner(owner)?;
                Ok(self.visit(owner)?.map(|base| {
                    Variable::new(field_variable_name(base.name(), field), e.ty.simplified())
                }))
            }
            CExprKind::Cast(operand) | CExprKind::ComplexCast { operand, .. } => self.visit(operand),
            _ => Ok(None),
        }
    }
}

/// Best-effort guess of the variable a pointer expression was read from.
///
/// `None` means no guess; the result is only used to look up deferred
/// allocations, never to restrict aliasing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PointerApproximatingVisitor;

impl PointerApproximatingVisitor {
    pub fn new() -> Self {
        Self
    }

    pub fn visit(&self, e: &CExpr) -> EncodingResult<Option<String>> {
        match &e.kind {
            CExprKind::Id(name) => Ok(Some(name.clone())),
            CExprKind::Subscript { array, .. } => self.visit(array),
            CExprKind::Binary { left, right, .. } => {
                let ty = e.ty.simplified();
                if !(ty.is_pointer() || ty.is_array()) {
                    return Ok(None);
                }
                match self.visit(left)? {
                    Some(name) => Ok(Some(name)),
                    None => self.visit(right),
                }
            }
            CExprKind::Cast(operand)
            | CExprKind::Deref(operand)
            | CExprKind::AddressOf(operand) => self.visit(operand),
            CExprKind::FieldRef { .. } => {
                let e = e.with_explicit_pointer_dereference();
                let CExprKind::FieldRef { owner, field, .. } = &e.kind else {
                    return Ok(None);
                };
                let owner_ty = composite_owner(owner)?;
                Ok(Some(field_access_name(&owner_ty, field)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PointerAliasingConfig;
    use crate::region::DefaultRegionManager;
    use c2smt_types::{BinOp, StructField};
    use std::sync::Arc;

    fn s_type() -> CType {
        CType::structure(
            "S",
            vec![
                StructField::new("f", CType::int()),
                StructField::new("p", CType::ptr(CType::int())),
            ],
        )
    }

    fn pts_with_base(name: &str, ty: &CType) -> PointerTargetSet {
        let mut b = PointerTargetSet::empty().builder(
            Arc::new(PointerAliasingConfig::default()),
            Arc::new(DefaultRegionManager::new()),
        );
        b.add_base(name, ty).unwrap();
        b.build()
    }

    #[test]
    fn test_unaliased_field_is_flattened() {
        let pts = PointerTargetSet::empty();
        let v = BaseVisitor::new(&pts);
        let e = CExpr::field(CExpr::id("main::s", s_type()), "f");
        let var = v.visit(&e).unwrap().unwrap();
        assert_eq!(var.name(), "main::s$f");
        assert_eq!(var.ty(), &CType::int());
    }

    #[test]
    fn test_bases_and_arrays_are_not_unaliased() {
        let pts = pts_with_base("main::s", &s_type());
        let v = BaseVisitor::new(&pts);
        let e = CExpr::field(CExpr::id("main::s", s_type()), "f");
        assert_eq!(v.visit(&e).unwrap(), None);

        let empty = PointerTargetSet::empty();
        let v = BaseVisitor::new(&empty);
        let a = CExpr::id("main::a", CType::array(CType::int(), 2));
        assert_eq!(v.visit(&a).unwrap(), None);
        let sub = CExpr::subscript(a, CExpr::int(0, CType::int()));
        assert_eq!(v.visit(&sub).unwrap(), None);
        let p = CExpr::id("main::p", CType::ptr(s_type()));
        assert_eq!(v.visit(&CExpr::arrow(p.clone(), "f")).unwrap(), None);
        assert_eq!(v.visit(&CExpr::deref(p)).unwrap(), None);
        assert_eq!(v.visit(&CExpr::int(3, CType::int())).unwrap(), None);
    }

    #[test]
    fn test_casts_pass_through() {
        let pts = PointerTargetSet::empty();
        let v = BaseVisitor::new(&pts);
        let e = CExpr::cast(CType::long(), CExpr::id("main::x", CType::int()));
        assert_eq!(v.visit(&e).unwrap().unwrap().name(), "main::x");
    }

    #[test]
    fn test_non_composite_owner_is_unrecognized() {
        let pts = PointerTargetSet::empty();
        let bogus = CExpr::new(
            CExprKind::FieldRef {
                owner: Box::new(CExpr::id("main::x", CType::int())),
                field: "f".into(),
                is_pointer_dereference: false,
            },
            CType::int(),
        );
        let err = BaseVisitor::new(&pts).visit(&bogus).unwrap_err();
        assert!(matches!(err, EncodingError::UnrecognizedCode(_)));
        assert!(PointerApproximatingVisitor::new().visit(&bogus).is_err());
    }

    #[test]
    fn test_pointer_approximation() {
        let v = PointerApproximatingVisitor::new();
        let p = CExpr::id("main::p", CType::void_ptr());
        let cast = CExpr::cast(CType::ptr(s_type()), p.clone());
        assert_eq!(v.visit(&cast).unwrap().as_deref(), Some("main::p"));

        let sum = CExpr::binary(
            BinOp::Add,
            CExpr::int(4, CType::long()),
            CExpr::id("main::q", CType::ptr(CType::int())),
            CType::ptr(CType::int()),
        );
        assert_eq!(v.visit(&sum).unwrap().as_deref(), Some("main::q"));

        let field = CExpr::arrow(CExpr::id("main::s", CType::ptr(s_type())), "p");
        assert_eq!(v.visit(&field).unwrap().as_deref(), Some("struct S$p"));

        let product = CExpr::binary(BinOp::Mul, p.clone(), p, CType::long());
        assert_eq!(v.visit(&product).unwrap(), None);
    }
}
