//! Typed C expressions
//!
//! The encoder works on expressions whose static type is already known. Every
//! node carries its (not necessarily simplified) C type; callers simplify it
//! before handing it to the memory model.

use crate::types::CType;
use serde::{Deserialize, Serialize};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Mod, // %

    // Bitwise
    BitAnd, // &
    BitOr,  // |
    BitXor, // ^
    Shl,    // <<
    Shr,    // >>

    // Comparison
    Eq, // ==
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=

    // Logical
    LogAnd, // &&
    LogOr,  // ||
}

impl BinOp {
    /// Check if this is a comparison operator
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    /// Check if this is a logical operator (short-circuit)
    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::LogAnd | BinOp::LogOr)
    }
}

/// Unary operators that are not lvalue-forming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,    // -
    BitNot, // ~
    LogNot, // !
}

/// Expression shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CExprKind {
    /// Reference to a declared variable by qualified name (`main::x`)
    Id(String),

    /// Integer literal
    IntLit(i128),

    /// Struct/union member access: `owner.field`, or `owner->field` when
    /// `is_pointer_dereference` is set
    FieldRef {
        owner: Box<CExpr>,
        field: String,
        is_pointer_dereference: bool,
    },

    /// Pointer dereference: `*operand`
    Deref(Box<CExpr>),

    /// Address-of: `&operand`
    AddressOf(Box<CExpr>),

    /// Array subscript: `array[index]`
    Subscript { array: Box<CExpr>, index: Box<CExpr> },

    /// Binary operation
    Binary {
        op: BinOp,
        left: Box<CExpr>,
        right: Box<CExpr>,
    },

    /// Unary operation
    Unary { op: UnaryOp, operand: Box<CExpr> },

    /// Type cast `(T) operand`; the target type is the node's type
    Cast(Box<CExpr>),

    /// `__real__`/`__imag__` cast of a complex value
    ComplexCast { operand: Box<CExpr>, is_real: bool },

    /// Function call by name
    Call { function: String, args: Vec<CExpr> },
}

/// C expression with its static type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CExpr {
    pub kind: CExprKind,
    pub ty: CType,
}

impl CExpr {
    pub fn new(kind: CExprKind, ty: CType) -> Self {
        Self { kind, ty }
    }

    /// Variable reference
    pub fn id(name: impl Into<String>, ty: CType) -> Self {
        Self::new(CExprKind::Id(name.into()), ty)
    }

    /// Integer literal of type `ty`
    pub fn int(value: i128, ty: CType) -> Self {
        Self::new(CExprKind::IntLit(value), ty)
    }

    /// `owner.field`; the member type is looked up in the owner's type
    pub fn field(owner: CExpr, field: impl Into<String>) -> Self {
        let field = field.into();
        let ty = owner
            .ty
            .get_field(&field)
            .map(|f| f.ty.clone())
            .unwrap_or(CType::Void);
        Self::new(
            CExprKind::FieldRef {
                owner: Box::new(owner),
                field,
                is_pointer_dereference: false,
            },
            ty,
        )
    }

    /// `pointer->field`
    pub fn arrow(pointer: CExpr, field: impl Into<String>) -> Self {
        let field = field.into();
        let ty = pointer
            .ty
            .pointee()
            .and_then(|t| t.get_field(&field))
            .map(|f| f.ty.clone())
            .unwrap_or(CType::Void);
        Self::new(
            CExprKind::FieldRef {
                owner: Box::new(pointer),
                field,
                is_pointer_dereference: true,
            },
            ty,
        )
    }

    /// `*operand`
    pub fn deref(operand: CExpr) -> Self {
        let ty = operand
            .ty
            .pointee()
            .or_else(|| operand.ty.element())
            .cloned()
            .unwrap_or(CType::Void);
        Self::new(CExprKind::Deref(Box::new(operand)), ty)
    }

    /// `&operand`
    pub fn address_of(operand: CExpr) -> Self {
        let ty = CType::ptr(operand.ty.clone());
        Self::new(CExprKind::AddressOf(Box::new(operand)), ty)
    }

    /// `array[index]`
    pub fn subscript(array: CExpr, index: CExpr) -> Self {
        let ty = array
            .ty
            .element()
            .or_else(|| array.ty.pointee())
            .cloned()
            .unwrap_or(CType::Void);
        Self::new(
            CExprKind::Subscript {
                array: Box::new(array),
                index: Box::new(index),
            },
            ty,
        )
    }

    /// Binary operation with an explicit result type
    pub fn binary(op: BinOp, left: CExpr, right: CExpr, ty: CType) -> Self {
        Self::new(
            CExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn unary(op: UnaryOp, operand: CExpr, ty: CType) -> Self {
        Self::new(
            CExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    /// `(ty) operand`
    pub fn cast(ty: CType, operand: CExpr) -> Self {
        Self::new(CExprKind::Cast(Box::new(operand)), ty)
    }

    /// Call of a named function
    pub fn call(function: impl Into<String>, args: Vec<CExpr>, ty: CType) -> Self {
        Self::new(
            CExprKind::Call {
                function: function.into(),
                args,
            },
            ty,
        )
    }

    /// Rewrite `p->f` into `(*p).f`; every other expression is returned as is
    pub fn with_explicit_pointer_dereference(&self) -> CExpr {
        match &self.kind {
            CExprKind::FieldRef {
                owner,
                field,
                is_pointer_dereference: true,
            } => CExpr::new(
                CExprKind::FieldRef {
                    owner: Box::new(CExpr::deref((**owner).clone())),
                    field: field.clone(),
                    is_pointer_dereference: false,
                },
                self.ty.clone(),
            ),
            _ => self.clone(),
        }
    }

    /// Whether this expression can designate an object
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            CExprKind::Id(_)
                | CExprKind::FieldRef { .. }
                | CExprKind::Deref(_)
                | CExprKind::Subscript { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructField;

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
    fn test_field_types_are_looked_up() {
        let s = CExpr::id("main::s", s_type());
        assert_eq!(CExpr::field(s, "g").ty, CType::long());

        let p = CExpr::id("main::p", CType::ptr(s_type()));
        assert_eq!(CExpr::arrow(p, "f").ty, CType::int());
    }

    #[test]
    fn test_explicit_pointer_dereference() {
        let p = CExpr::id("main::p", CType::ptr(s_type()));
        let arrow = CExpr::arrow(p.clone(), "f");
        let explicit = arrow.with_explicit_pointer_dereference();
        match explicit.kind {
            CExprKind::FieldRef {
                owner,
                is_pointer_dereference,
                ..
            } => {
                assert!(!is_pointer_dereference);
                assert_eq!(*owner, CExpr::deref(p));
                assert_eq!(owner.ty, s_type());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_subscript_type() {
        let a = CExpr::id("a", CType::array(CType::short(), 3));
        let e = CExpr::subscript(a, CExpr::int(1, CType::int()));
        assert_eq!(e.ty, CType::short());
        assert!(e.is_lvalue());
    }
}
