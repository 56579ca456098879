//! Guard for the "simplified type" invariant
//!
//! Every type handed to the memory model must already be simplified. The
//! check fails instead of normalising so that callers producing unsimplified
//! types are caught where the bug is, not where a region name silently
//! diverges.

use crate::types::CType;
use thiserror::Error;

/// Violations of the simplified-type invariant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("type `{0}` is const-qualified")]
    Const(String),

    #[error("type `{0}` is volatile-qualified")]
    Volatile(String),

    #[error("type `{ty}` is not canonical (expected `{canonical}`)")]
    NotCanonical { ty: String, canonical: String },

    #[error("type `{ty}` is not simplified (expected `{simplified}`)")]
    NotSimplified { ty: String, simplified: String },
}

/// Result type for type-invariant checks
pub type TypeResult<T> = Result<T, TypeError>;

/// Return `ty` unchanged if it is simplified, fail otherwise.
pub fn check_simplified(ty: &CType) -> TypeResult<&CType> {
    if ty.is_const() {
        return Err(TypeError::Const(ty.to_string()));
    }
    if ty.is_volatile() {
        return Err(TypeError::Volatile(ty.to_string()));
    }
    let canonical = ty.canonical();
    if &canonical != ty {
        return Err(TypeError::NotCanonical {
            ty: ty.to_string(),
            canonical: canonical.to_string(),
        });
    }
    let simplified = ty.simplified();
    if &simplified != ty {
        return Err(TypeError::NotSimplified {
            ty: ty.to_string(),
            simplified: simplified.to_string(),
        });
    }
    Ok(ty)
}

/// Convenience predicate over [`check_simplified`]
pub fn is_simplified(ty: &CType) -> bool {
    check_simplified(ty).is_ok()
}
