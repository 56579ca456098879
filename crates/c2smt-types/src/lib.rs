//! Simplified C types for the pointer-aliasing encoder
//!
//! - `types`: the C type system (LP64 layout, structural equality)
//! - `simplify`: the simplified-type invariant checker
//! - `expr`: typed C expressions consumed by the encoder

pub mod expr;
pub mod simplify;
pub mod types;

pub use expr::{BinOp, CExpr, CExprKind, UnaryOp};
pub use simplify::{check_simplified, is_simplified, TypeError, TypeResult};
pub use types::{CType, FloatKind, IntKind, Signedness, StructField, POINTER_SIZE};
