//! Error types for the pointer-aliasing encoder

use c2smt_formula::FormulaError;
use c2smt_types::TypeError;
use thiserror::Error;

/// Encoding errors
///
/// The variants separate input the encoder does not understand from input it
/// understands but cannot encode under the active configuration, and both
/// from broken caller invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// Expression or statement shape with no encoding rule
    #[error("unrecognized code: {0}")]
    UnrecognizedCode(String),

    /// Recognized construct the active heap or configuration cannot encode
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Caller bug: conflicting merge values, duplicate base with another type
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Non-simplified type reached the memory model
    #[error("type invariant violated: {0}")]
    Type(#[from] TypeError),

    #[error("formula error: {0}")]
    Formula(#[from] FormulaError),
}

impl EncodingError {
    /// Whether the caller may recover by weakening precision
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            EncodingError::Unsupported(_) | EncodingError::Formula(FormulaError::Unsupported(_))
        )
    }

    /// Whether the error reports a bug in the caller
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            EncodingError::InvariantViolation(_) | EncodingError::Type(_)
        )
    }
}

/// Result type for encoding operations
pub type EncodingResult<T> = Result<T, EncodingError>;
